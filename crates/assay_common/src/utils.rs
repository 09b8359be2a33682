use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Symbols stripped from price-like strings before parsing.
const CURRENCY_SYMBOLS: &[char] = &['$', '£', '€', '¥', ','];

/// Gets the current timestamp.
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a price-like string such as `"$1,234.56"` into a finite number.
///
/// Currency symbols and thousands separators are ignored. Words like
/// `"CALL"` or `"N/A"` do not parse.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c))
        .collect();

    parse_finite(cleaned.trim())
}

/// Parse a plain numeric string, rejecting `NaN` and infinities.
pub fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Canonical text form of a timestamp. Parsing it back is lossless.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decimal_strips_currency_and_separators() {
        assert_eq!(parse_decimal("$19.99"), Some(19.99));
        assert_eq!(parse_decimal(" $1,234.50 "), Some(1234.5));
        assert_eq!(parse_decimal("€7"), Some(7.0));
        assert_eq!(parse_decimal("-5"), Some(-5.0));
    }

    #[test]
    fn decimal_rejects_words_and_non_finite() {
        assert_eq!(parse_decimal("CALL"), None);
        assert_eq!(parse_decimal("N/A"), None);
        assert_eq!(parse_decimal("$"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn timestamps_accept_naive_and_offset_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();

        assert_eq!(parse_timestamp("2026-01-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn formatted_timestamp_parses_back() {
        let ts = parse_timestamp("2026-03-04T05:06:07.123456").unwrap();
        let text = format_timestamp(&ts);

        assert_eq!(text, "2026-03-04T05:06:07.123456Z");
        assert_eq!(parse_timestamp(&text), Some(ts));
    }
}
