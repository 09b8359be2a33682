use crate::{
    models::{CleanRecord, QuarantineRecord, RawRecord, Validation},
    schema::{Coercion, FieldSpec, Schema},
    utils::{format_timestamp, parse_decimal, parse_finite, parse_timestamp},
};
use chrono::{DateTime, Utc};
use serde_json::{Number, Value};
use tracing::trace;

/// Reason reported for payloads that are not JSON objects.
pub const NOT_AN_OBJECT: &str = "payload not a JSON object";

/// Validates raw records against a [`Schema`].
///
/// Every check runs on every record so that all rejection reasons are
/// collected: presence first, then coercion, then ranges, each phase in
/// schema field order.
#[derive(Clone, Debug)]
pub struct RecordValidator {
    schema: Schema,
}

/// A field value after coercion.
#[derive(Clone, Debug)]
enum Coerced {
    Text(String),
    Number(f64),
    Integer(i64),
    Timestamp(DateTime<Utc>),
    Untyped(Value),
}

impl Coerced {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Text(s) => Value::String(s),
            // Finite by construction
            Self::Number(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
            Self::Integer(v) => Value::from(v),
            Self::Timestamp(ts) => Value::String(format_timestamp(&ts)),
            Self::Untyped(v) => v,
        }
    }
}

impl RecordValidator {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate a record using the current time for lateness checks.
    pub fn validate(&self, raw: &RawRecord) -> Validation {
        self.validate_at(raw, Utc::now())
    }

    /// Validate a record against an explicit clock.
    pub fn validate_at(&self, raw: &RawRecord, now: DateTime<Utc>) -> Validation {
        let Some(fields) = raw.fields() else {
            return Validation::Invalid(QuarantineRecord::new(
                raw.clone(),
                vec![NOT_AN_OBJECT.to_string()],
            ));
        };

        let mut reasons = Vec::new();

        // Presence; blank strings count as missing
        let mut present = Vec::with_capacity(self.schema.fields().len());
        for spec in self.schema.fields() {
            match fields.get(&spec.name).filter(|v| !is_blank(v)) {
                Some(value) => present.push((spec, value)),
                None if spec.required => reasons.push(format!("missing {}", spec.name)),
                None => {}
            }
        }

        // Coercion
        let mut coerced = Vec::with_capacity(present.len());
        for (spec, value) in present {
            match spec.kind {
                None => coerced.push((spec, Coerced::Untyped(value.clone()))),
                Some(kind) => match coerce(kind, value) {
                    Some(c) => coerced.push((spec, c)),
                    None => reasons.push(coercion_failure(spec, kind)),
                },
            }
        }

        // Range
        for (spec, value) in &coerced {
            if let Some(reason) = check_bounds(spec, value, now) {
                reasons.push(reason);
            }
        }

        if !reasons.is_empty() {
            trace!(reasons = ?reasons, "Record rejected");
            return Validation::Invalid(QuarantineRecord::new(raw.clone(), reasons));
        }

        let mut clean = fields.clone();
        for spec in self.schema.fields() {
            clean.remove(&spec.name);
        }
        for (spec, value) in coerced {
            clean.insert(spec.name.clone(), value.into_value());
        }

        Validation::Valid(CleanRecord::new(clean))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn coerce(kind: Coercion, value: &Value) -> Option<Coerced> {
    match kind {
        Coercion::Text => match value {
            Value::String(s) => Some(Coerced::Text(s.trim().to_string())),
            Value::Number(n) => Some(Coerced::Text(n.to_string())),
            Value::Bool(b) => Some(Coerced::Text(b.to_string())),
            _ => None,
        },
        Coercion::Decimal => match value {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(Coerced::Number),
            Value::String(s) => parse_decimal(s).map(Coerced::Number),
            _ => None,
        },
        Coercion::Float => match value {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(Coerced::Number),
            Value::String(s) => parse_finite(s).map(Coerced::Number),
            _ => None,
        },
        Coercion::Integer => coerce_integer(value).map(Coerced::Integer),
        Coercion::Timestamp => match value {
            Value::String(s) => parse_timestamp(s).map(Coerced::Timestamp),
            _ => None,
        },
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn truncate(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    (truncated.is_finite() && truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64)
        .then_some(truncated as i64)
}

fn coercion_failure(spec: &FieldSpec, kind: Coercion) -> String {
    match kind {
        Coercion::Text => format!("{} not text", spec.name),
        Coercion::Timestamp => format!("{} not a timestamp", spec.name),
        Coercion::Decimal | Coercion::Integer | Coercion::Float => {
            format!("{} not numeric", spec.name)
        }
    }
}

fn check_bounds(spec: &FieldSpec, value: &Coerced, now: DateTime<Utc>) -> Option<String> {
    if let (Some(range), Some(number)) = (&spec.range, value.as_f64()) {
        if !range.contains(number) {
            return Some(format!("{} out of range", spec.name));
        }
    }

    if let (Some(max_age), Coerced::Timestamp(ts)) = (spec.max_age_seconds, value) {
        let too_old = i64::try_from(max_age)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .is_some_and(|max_age| now.signed_duration_since(*ts) > max_age);
        if too_old {
            return Some(format!("{} too old", spec.name));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, Range};
    use chrono::TimeZone;
    use serde_json::json;

    fn products() -> RecordValidator {
        RecordValidator::new(Schema::products())
    }

    fn sensors() -> RecordValidator {
        RecordValidator::new(Schema::sensor_readings())
    }

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 10, 5, 0).unwrap()
    }

    fn raw(value: Value) -> RawRecord {
        RawRecord::from_json(value.to_string())
    }

    #[test]
    fn currency_price_and_string_stock_are_coerced() {
        let record = raw(json!({
            "product_id": "P001",
            "name": "Widget",
            "price": "$19.99",
            "stock": "10"
        }));

        let Validation::Valid(clean) = products().validate(&record) else {
            panic!("expected a valid record");
        };

        let expected = json!({
            "product_id": "P001",
            "name": "Widget",
            "price": 19.99,
            "stock": 10
        });
        assert_eq!(Value::Object(clean.fields().clone()), expected);
    }

    #[test]
    fn all_reasons_are_collected_in_phase_order() {
        let record = raw(json!({
            "product_id": "P003",
            "name": null,
            "price": "CALL",
            "stock": "-1"
        }));

        let outcome = products().validate(&record);

        assert!(!outcome.is_valid());
        assert_eq!(
            outcome.reasons(),
            ["missing name", "price not numeric", "stock out of range"]
        );
    }

    #[test]
    fn invalid_record_keeps_original_payload() {
        let text = r#"{"product_id":"P9","name":"  ","price":"$0.00","stock":3}"#;
        let record = RawRecord::from_json(text);

        let Validation::Invalid(quarantined) = products().validate(&record) else {
            panic!("expected an invalid record");
        };

        assert_eq!(quarantined.raw().payload(), text.as_bytes());
        assert_eq!(quarantined.raw(), &record);
        assert_eq!(quarantined.reasons(), ["missing name", "price out of range"]);
    }

    #[test]
    fn absent_fields_are_reported_missing() {
        let outcome = products().validate(&raw(json!({"name": "Widget"})));

        assert_eq!(
            outcome.reasons(),
            ["missing product_id", "missing price", "missing stock"]
        );
    }

    #[test]
    fn text_is_trimmed_and_extras_pass_through() {
        let record = raw(json!({
            "product_id": 42,
            "name": "  Coffee Maker ",
            "price": 12,
            "stock": 3.9,
            "category": " Home ",
            "source": "vendor_a"
        }));

        let Validation::Valid(clean) = products().validate(&record) else {
            panic!("expected a valid record");
        };

        assert_eq!(clean.get_str("product_id"), Some("42"));
        assert_eq!(clean.get_str("name"), Some("Coffee Maker"));
        assert_eq!(clean.get_f64("price"), Some(12.0));
        assert_eq!(clean.get_i64("stock"), Some(3));
        assert_eq!(clean.get_str("category"), Some("Home"));
        assert_eq!(clean.get_str("source"), Some("vendor_a"));
    }

    #[test]
    fn blank_optional_field_is_dropped() {
        let record = raw(json!({
            "product_id": "P1",
            "name": "Mouse",
            "price": 5,
            "stock": 1,
            "category": "   "
        }));

        let Validation::Valid(clean) = products().validate(&record) else {
            panic!("expected a valid record");
        };
        assert!(clean.get("category").is_none());
    }

    #[test]
    fn wrong_shapes_are_not_numeric_or_text() {
        let record = raw(json!({
            "product_id": ["P1"],
            "name": "Mouse",
            "price": true,
            "stock": "1.5"
        }));

        assert_eq!(
            products().validate(&record).reasons(),
            ["product_id not text", "price not numeric", "stock not numeric"]
        );
    }

    #[test]
    fn non_object_payload_is_invalid() {
        let record = RawRecord::from_json("not json at all");
        let outcome = products().validate(&record);

        assert_eq!(outcome.reasons(), [NOT_AN_OBJECT]);
    }

    #[test]
    fn sensor_reading_is_normalized() {
        let record = raw(json!({
            "sensor_id": "sensor_001",
            "location": "warehouse_a",
            "timestamp": "2026-01-01T10:00:00.250000",
            "temperature": 21.5,
            "humidity": "40",
            "pressure": 1001.2
        }));

        let Validation::Valid(clean) = sensors().validate_at(&record, clock()) else {
            panic!("expected a valid record");
        };

        assert_eq!(clean.get_str("timestamp"), Some("2026-01-01T10:00:00.250Z"));
        assert_eq!(clean.get_f64("humidity"), Some(40.0));
        assert_eq!(clean.get_str("location"), Some("warehouse_a"));
    }

    #[test]
    fn late_and_out_of_range_readings_are_rejected() {
        let record = raw(json!({
            "sensor_id": "sensor_003",
            "timestamp": "2026-01-01T09:00:00",
            "temperature": 99.0,
            "humidity": -1,
            "pressure": "high"
        }));

        assert_eq!(
            sensors().validate_at(&record, clock()).reasons(),
            [
                "pressure not numeric",
                "timestamp too old",
                "temperature out of range",
                "humidity out of range"
            ]
        );
    }

    #[test]
    fn unparseable_timestamp_is_reported() {
        let record = raw(json!({
            "sensor_id": "sensor_003",
            "timestamp": "soon",
            "temperature": 20,
            "humidity": 50,
            "pressure": 1000
        }));

        assert_eq!(
            sensors().validate_at(&record, clock()).reasons(),
            ["timestamp not a timestamp"]
        );
    }

    #[test]
    fn revalidating_clean_record_is_stable() {
        let record = raw(json!({
            "sensor_id": " sensor_002 ",
            "timestamp": "2026-01-01T11:04:00+01:00",
            "temperature": "19",
            "humidity": 55.5,
            "pressure": 1000
        }));

        let Validation::Valid(first) = sensors().validate_at(&record, clock()) else {
            panic!("expected a valid record");
        };
        let again = sensors().validate_at(&first.to_raw(), clock());

        assert_eq!(again, Validation::Valid(first));
    }

    #[test]
    fn untyped_optional_field_passes_through() {
        let schema = Schema::new(
            vec![
                FieldSpec::builder()
                    .name("qty")
                    .kind(Coercion::Integer)
                    .range(Range::between(1.0, 5.0))
                    .build(),
                FieldSpec::builder().name("note").required(false).build(),
            ],
            vec![],
        )
        .unwrap();

        let record = raw(json!({"qty": 2, "note": {"free": "form"}}));
        let Validation::Valid(clean) = RecordValidator::new(schema).validate(&record) else {
            panic!("expected a valid record");
        };

        assert_eq!(clean.get("note"), Some(&json!({"free": "form"})));
    }
}
