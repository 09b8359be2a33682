use crate::{Error, Result};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a raw field value is coerced into its canonical type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    /// Trimmed string; numbers and booleans are stringified
    Text,

    /// Price-like number, currency symbols and separators allowed
    Decimal,

    /// Whole number; floats are truncated toward zero
    Integer,

    /// Plain floating point number
    Float,

    /// RFC 3339 or naive ISO-8601 timestamp, normalized to UTC
    Timestamp,
}

impl Coercion {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Decimal | Self::Integer | Self::Float)
    }
}

/// Numeric bounds for a field. Each side is optional and inclusive
/// unless marked exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,

    #[serde(default)]
    pub min_exclusive: bool,

    #[serde(default)]
    pub max_exclusive: bool,
}

impl Range {
    /// `value >= min`
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            ..Self::default()
        }
    }

    /// `value > min`
    pub fn greater_than(min: f64) -> Self {
        Self {
            min: Some(min),
            min_exclusive: true,
            ..Self::default()
        }
    }

    /// `min <= value <= max`
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let above = match self.min {
            Some(min) if self.min_exclusive => value > min,
            Some(min) => value >= min,
            None => true,
        };
        let below = match self.max {
            Some(max) if self.max_exclusive => value < max,
            Some(max) => value <= max,
            None => true,
        };

        above && below
    }
}

fn default_required() -> bool {
    true
}

/// Declaration of a single field in a [`Schema`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
pub struct FieldSpec {
    /// Field name as it appears in the record
    #[builder(into)]
    pub name: String,

    /// Whether the field must be present and non-blank
    #[builder(default = true)]
    #[serde(default = "default_required")]
    pub required: bool,

    /// Coercion rule; an optional field without one passes through as is
    #[serde(default)]
    pub kind: Option<Coercion>,

    /// Accepted numeric range, numeric kinds only
    #[serde(default)]
    pub range: Option<Range>,

    /// Maximum age relative to the validation clock, timestamps only
    #[serde(default)]
    pub max_age_seconds: Option<u64>,
}

/// Serialized form of a [`Schema`], as found in configuration files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub fields: Vec<FieldSpec>,

    #[serde(default)]
    pub key_fields: Vec<String>,
}

/// Ordered field declarations interpreted by the record validator.
///
/// A schema is checked once when built, so a malformed declaration is a
/// startup failure and never a per-record one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaConfig", into = "SchemaConfig")]
pub struct Schema {
    fields: Vec<FieldSpec>,
    key_fields: Vec<String>,
}

impl Schema {
    /// Build a schema, rejecting malformed declarations.
    pub fn new(fields: Vec<FieldSpec>, key_fields: Vec<String>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::Config("Schema must declare at least one field".to_string()));
        }

        let mut names = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(Error::Config("Schema field name cannot be empty".to_string()));
            }

            if !names.insert(field.name.as_str()) {
                return Err(Error::Config(format!(
                    "Schema field declared twice: {}",
                    field.name
                )));
            }

            if field.required && field.kind.is_none() {
                return Err(Error::Config(format!(
                    "Required field {} has no declared type",
                    field.name
                )));
            }

            if let Some(range) = &field.range {
                if !field.kind.is_some_and(Coercion::is_numeric) {
                    return Err(Error::Config(format!(
                        "Range declared on non-numeric field {}",
                        field.name
                    )));
                }

                if let (Some(min), Some(max)) = (range.min, range.max) {
                    if min > max {
                        return Err(Error::Config(format!(
                            "Range minimum exceeds maximum for field {}",
                            field.name
                        )));
                    }
                }
            }

            if field.max_age_seconds.is_some() && field.kind != Some(Coercion::Timestamp) {
                return Err(Error::Config(format!(
                    "Maximum age declared on non-timestamp field {}",
                    field.name
                )));
            }
        }

        for key in &key_fields {
            match fields.iter().find(|f| &f.name == key) {
                Some(field) if field.required => {}
                Some(_) => {
                    return Err(Error::Config(format!("Key field {} must be required", key)));
                }
                None => {
                    return Err(Error::Config(format!("Key field {} is not declared", key)));
                }
            }
        }

        Ok(Self { fields, key_fields })
    }

    /// The product schema used by the batch pipeline.
    pub fn products() -> Self {
        Self::new(
            vec![
                FieldSpec::builder()
                    .name("product_id")
                    .kind(Coercion::Text)
                    .build(),
                FieldSpec::builder().name("name").kind(Coercion::Text).build(),
                FieldSpec::builder()
                    .name("price")
                    .kind(Coercion::Decimal)
                    .range(Range::greater_than(0.0))
                    .build(),
                FieldSpec::builder()
                    .name("stock")
                    .kind(Coercion::Integer)
                    .range(Range::at_least(0.0))
                    .build(),
                FieldSpec::builder()
                    .name("category")
                    .required(false)
                    .kind(Coercion::Text)
                    .build(),
            ],
            vec!["product_id".to_string()],
        )
        .expect("Built-in product schema should be valid")
    }

    /// The sensor reading schema used by the stream pipeline.
    pub fn sensor_readings() -> Self {
        Self::new(
            vec![
                FieldSpec::builder()
                    .name("sensor_id")
                    .kind(Coercion::Text)
                    .build(),
                FieldSpec::builder()
                    .name("timestamp")
                    .kind(Coercion::Timestamp)
                    .max_age_seconds(30 * 60)
                    .build(),
                FieldSpec::builder()
                    .name("temperature")
                    .kind(Coercion::Float)
                    .range(Range::between(-40.0, 85.0))
                    .build(),
                FieldSpec::builder()
                    .name("humidity")
                    .kind(Coercion::Float)
                    .range(Range::between(0.0, 100.0))
                    .build(),
                FieldSpec::builder()
                    .name("pressure")
                    .kind(Coercion::Float)
                    .range(Range::between(900.0, 1100.0))
                    .build(),
            ],
            vec!["sensor_id".to_string(), "timestamp".to_string()],
        )
        .expect("Built-in sensor schema should be valid")
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }
}

impl TryFrom<SchemaConfig> for Schema {
    type Error = Error;

    fn try_from(config: SchemaConfig) -> Result<Self> {
        Self::new(config.fields, config.key_fields)
    }
}

impl From<Schema> for SchemaConfig {
    fn from(schema: Schema) -> Self {
        Self {
            fields: schema.fields,
            key_fields: schema.key_fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str) -> FieldSpec {
        FieldSpec::builder().name(name).kind(Coercion::Text).build()
    }

    #[test]
    fn built_in_schemas_are_well_formed() {
        assert_eq!(Schema::products().fields().len(), 5);
        assert_eq!(Schema::sensor_readings().key_fields(), ["sensor_id", "timestamp"]);
    }

    #[test]
    fn range_bounds() {
        assert!(!Range::greater_than(0.0).contains(0.0));
        assert!(Range::greater_than(0.0).contains(0.01));
        assert!(Range::at_least(0.0).contains(0.0));
        assert!(Range::between(-40.0, 85.0).contains(85.0));
        assert!(!Range::between(-40.0, 85.0).contains(85.1));
        assert!(Range::default().contains(f64::MAX));
    }

    #[test]
    fn required_field_without_type_is_rejected() {
        let untyped = FieldSpec::builder().name("price").build();

        let err = Schema::new(vec![untyped], vec![]).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("price")));
    }

    #[test]
    fn optional_untyped_field_is_allowed() {
        let location = FieldSpec::builder().name("location").required(false).build();
        assert!(Schema::new(vec![text("id"), location], vec![]).is_ok());
    }

    #[test]
    fn malformed_declarations_are_rejected() {
        assert!(Schema::new(vec![], vec![]).is_err());
        assert!(Schema::new(vec![text("a"), text("a")], vec![]).is_err());
        assert!(Schema::new(vec![text(" ")], vec![]).is_err());
        assert!(Schema::new(vec![text("a")], vec!["b".to_string()]).is_err());

        let ranged_text = FieldSpec::builder()
            .name("name")
            .kind(Coercion::Text)
            .range(Range::at_least(0.0))
            .build();
        assert!(Schema::new(vec![ranged_text], vec![]).is_err());

        let inverted = FieldSpec::builder()
            .name("n")
            .kind(Coercion::Float)
            .range(Range::between(10.0, 1.0))
            .build();
        assert!(Schema::new(vec![inverted], vec![]).is_err());

        let aged_number = FieldSpec::builder()
            .name("n")
            .kind(Coercion::Float)
            .max_age_seconds(5)
            .build();
        assert!(Schema::new(vec![aged_number], vec![]).is_err());

        let optional_key = FieldSpec::builder()
            .name("id")
            .required(false)
            .kind(Coercion::Text)
            .build();
        assert!(Schema::new(vec![optional_key], vec!["id".to_string()]).is_err());
    }

    #[test]
    fn deserialization_runs_schema_checks() {
        let ok: Schema = serde_json::from_str(
            r#"{
                "fields": [
                    {"name": "id", "kind": "text"},
                    {"name": "qty", "kind": "integer", "range": {"min": 0}}
                ],
                "key_fields": ["id"]
            }"#,
        )
        .unwrap();
        assert_eq!(ok.fields()[1].range, Some(Range::at_least(0.0)));
        assert!(ok.fields()[0].required);

        let missing_type = serde_json::from_str::<Schema>(r#"{"fields": [{"name": "id"}]}"#);
        assert!(missing_type.is_err());
    }
}
