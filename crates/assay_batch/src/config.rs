use assay_common::{Error, config::load_layered, schema::Schema};
use bon::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for the batch pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct Config {
    /// Database holding the raw, clean and quarantine zones
    pub database: DatabaseConfig,

    /// Validation run settings
    #[builder(default)]
    #[serde(default)]
    pub batch: BatchConfig,

    /// Extraction stage settings
    #[builder(default)]
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Product schema; the built-in one unless overridden
    #[builder(default = Schema::products())]
    #[serde(default = "Schema::products")]
    pub schema: Schema,
}

/// Database configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct DatabaseConfig {
    /// Database URL
    #[builder(into)]
    pub url: String,

    /// Maximum connections in the pool
    #[builder(default = default_max_connections())]
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections in the pool
    #[builder(default = default_min_connections())]
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[builder(default = default_connect_timeout())]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

/// Validation run configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct BatchConfig {
    /// Batch to validate; a fresh one is generated when unset
    pub batch_id: Option<String>,

    /// Quarantine records whose key was already seen in the same run
    #[builder(default = true)]
    #[serde(default = "default_dedupe")]
    pub dedupe: bool,
}

/// Extraction (scraper) configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct ExtractConfig {
    /// Whether to scrape and load a new batch before validating
    #[builder(default = true)]
    #[serde(default = "default_extract_enabled")]
    pub enabled: bool,

    /// Vendors to scrape
    #[builder(default = default_sources())]
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Products generated per vendor
    #[builder(default = default_products_per_source())]
    #[serde(default = "default_products_per_source")]
    pub products_per_source: usize,

    /// Seed for reproducible data
    pub seed: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_dedupe() -> bool {
    true
}

fn default_extract_enabled() -> bool {
    true
}

fn default_sources() -> Vec<String> {
    ["vendor_a", "vendor_b", "vendor_c"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_products_per_source() -> usize {
    15
}

impl Config {
    /// Load configuration from files and `ASSAY_BATCH__*` environment variables.
    pub fn load() -> Result<Self, Error> {
        load_layered("ASSAY_BATCH")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_daily_pipeline() {
        let config: Config =
            serde_json::from_str(r#"{"database": {"url": "postgres://localhost/pipeline_db"}}"#)
                .unwrap();

        assert!(config.batch.dedupe);
        assert!(config.batch.batch_id.is_none());
        assert!(config.extract.enabled);
        assert_eq!(config.extract.sources.len(), 3);
        assert_eq!(config.extract.products_per_source, 15);
        assert_eq!(config.schema, Schema::products());
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn malformed_schema_fails_to_load() {
        let result = serde_json::from_str::<Config>(
            r#"{
                "database": {"url": "postgres://localhost/pipeline_db"},
                "schema": {"fields": [{"name": "price", "range": {"min": 0}}]}
            }"#,
        );

        assert!(result.is_err());
    }
}
