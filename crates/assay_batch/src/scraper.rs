use assay_common::models::{Fields, RawRecord};
use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde_json::{Value, json};

const CATALOG: &[(&str, &[&str])] = &[
    (
        "Electronics",
        &["Laptop", "Mouse", "Keyboard", "Monitor", "Webcam"],
    ),
    (
        "Books",
        &["Python Guide", "SQL Mastery", "Data Engineering", "Cloud Computing"],
    ),
    ("Home", &["Coffee Maker", "Blender", "Toaster", "Mixer"]),
];

/// Generates product listings the way a vendor scrape would return them,
/// including the usual quality problems: nulls, formatted prices,
/// negative stock, padded names and repeated rows.
pub struct ProductScraper {
    rng: StdRng,
}

impl ProductScraper {
    /// Create a scraper; a seed makes the output reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self { rng }
    }

    /// Scrape `count` products from `source`, plus a few duplicates.
    pub fn scrape_source(&mut self, source: &str, count: usize) -> Vec<RawRecord> {
        let mut products: Vec<Fields> = (0..count).map(|_| self.product(source)).collect();

        if !products.is_empty() {
            let duplicates = (count * 5 / 100).max(1);
            for _ in 0..duplicates {
                let copy = products[self.rng.gen_range(0..products.len())].clone();
                products.push(copy);
            }
        }

        products.into_iter().map(RawRecord::from_fields).collect()
    }

    fn product(&mut self, source: &str) -> Fields {
        let (category, names) = CATALOG[self.rng.gen_range(0..CATALOG.len())];
        let name = names.choose(&mut self.rng).copied().unwrap_or("Widget");
        let price = (self.rng.gen_range(10.0..500.0_f64) * 100.0).round() / 100.0;
        let stock: i64 = self.rng.gen_range(0..=100);

        let mut product = Fields::new();
        product.insert(
            "product_id".to_string(),
            json!(format!("P{}", self.rng.gen_range(1000..=9999))),
        );
        product.insert("name".to_string(), json!(name));
        product.insert("category".to_string(), json!(category));
        product.insert("price".to_string(), json!(price));
        product.insert("stock".to_string(), json!(stock));
        product.insert("source".to_string(), json!(source));
        product.insert("scraped_at".to_string(), json!(Utc::now().to_rfc3339()));

        // Roughly 27% of rows carry one problem
        let roll: f64 = self.rng.gen_range(0.0..1.0);
        if roll < 0.05 {
            product.insert("name".to_string(), Value::Null);
        } else if roll < 0.10 {
            product.remove("price");
        } else if roll < 0.15 {
            product.insert("price".to_string(), json!(format_price(price)));
        } else if roll < 0.18 {
            product.insert("stock".to_string(), json!(-self.rng.gen_range(1..=10_i64)));
        } else if roll < 0.20 {
            product.insert("stock".to_string(), json!(stock.to_string()));
        } else if roll < 0.23 {
            product.insert("name".to_string(), json!(format!("  {}  ", name)));
        } else if roll < 0.25 {
            product.insert("price".to_string(), json!("CALL"));
        } else if roll < 0.27 {
            product.remove("product_id");
        }

        product
    }
}

/// Format a price as a vendor would display it, e.g. `$1,234.50`.
pub fn format_price(price: f64) -> String {
    let fixed = format!("{:.2}", price.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_common::utils::parse_decimal;

    #[test]
    fn prices_are_grouped_like_a_storefront() {
        assert_eq!(format_price(19.99), "$19.99");
        assert_eq!(format_price(1234.5), "$1,234.50");
        assert_eq!(format_price(1_000_000.0), "$1,000,000.00");
        assert_eq!(parse_decimal(&format_price(4321.09)), Some(4321.09));
    }

    #[test]
    fn seeded_scrapes_are_reproducible() {
        let first = ProductScraper::new(Some(7)).scrape_source("vendor_a", 20);
        let second = ProductScraper::new(Some(7)).scrape_source("vendor_a", 20);

        let ids = |records: &[RawRecord]| {
            records
                .iter()
                .map(|r| r.get("product_id").cloned())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn scrape_appends_duplicates_and_tags_source() {
        let products = ProductScraper::new(Some(1)).scrape_source("vendor_b", 40);

        assert_eq!(products.len(), 42);
        assert!(
            products
                .iter()
                .all(|p| p.get_text("source").as_deref() == Some("vendor_b"))
        );
    }

    #[test]
    fn empty_scrape_has_no_duplicates() {
        assert!(ProductScraper::new(Some(1)).scrape_source("vendor_c", 0).is_empty());
    }
}
