use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Field name to value mapping shared by raw and clean records.
pub type Fields = serde_json::Map<String, Value>;

/// An unvalidated record exactly as it arrived from a source.
///
/// The payload bytes are kept alongside the decoded fields so a rejected
/// record can be stored byte-for-byte.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecord {
    /// The payload as received
    payload: Vec<u8>,

    /// Decoded fields, `None` when the payload is not a JSON object
    fields: Option<Fields>,
}

impl RawRecord {
    /// Decode a record from its JSON text. Never fails: a payload that is
    /// not a JSON object yields a record without fields.
    pub fn from_json(payload: impl Into<String>) -> Self {
        Self::from_bytes(payload.into().into_bytes())
    }

    /// Decode a record from raw message bytes. Bytes that are not UTF-8
    /// JSON yield a record without fields.
    pub fn from_bytes(payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let fields = match serde_json::from_slice::<Value>(&payload) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        };

        Self { payload, fields }
    }

    /// Build a record from already decoded fields.
    pub fn from_fields(fields: Fields) -> Self {
        let payload = Value::Object(fields.clone()).to_string().into_bytes();

        Self {
            payload,
            fields: Some(fields),
        }
    }

    /// The payload bytes as received.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as text, `None` when it is not valid UTF-8.
    pub fn payload_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// The payload as JSON text for a `jsonb` column.
    ///
    /// Objects are passed through as received; the database may still
    /// normalize whitespace and key order, so the byte-exact copy is the
    /// one held here. Anything else is stored as a JSON string, with bytes
    /// that are not UTF-8 written as `\xNN` escapes.
    pub fn to_json_text(&self) -> Result<String> {
        if self.fields.is_some() {
            if let Some(text) = self.payload_text() {
                return Ok(text.to_string());
            }
        }

        let text = match self.payload_text() {
            Some(text) => text.to_string(),
            None => self.payload.escape_ascii().to_string(),
        };

        Ok(serde_json::to_string(&text)?)
    }

    /// The decoded fields, if the payload was a JSON object.
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// Get a single raw field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.as_ref().and_then(|f| f.get(name))
    }

    /// Get a field rendered as trimmed text, for log lines and sink columns.
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(key_part)
    }

    /// Build the natural identifier of this record from `key_fields`.
    ///
    /// Returns `None` when any key field is absent, null or blank.
    pub fn key(&self, key_fields: &[String]) -> Option<String> {
        if key_fields.is_empty() {
            return None;
        }

        let parts = key_fields
            .iter()
            .map(|name| self.get(name).and_then(key_part))
            .collect::<Option<Vec<_>>>()?;

        Some(parts.join("_"))
    }
}

fn key_part(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A validated record with every declared field coerced to its
/// canonical type. Undeclared fields pass through unchanged.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CleanRecord(Fields);

impl CleanRecord {
    pub(crate) fn new(fields: Fields) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Fields {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Turn this record back into raw input, e.g. for reprocessing.
    pub fn to_raw(&self) -> RawRecord {
        RawRecord::from_fields(self.0.clone())
    }
}

/// A rejected record: the untouched original plus every reason it failed.
#[derive(Clone, Debug, PartialEq)]
pub struct QuarantineRecord {
    raw: RawRecord,
    reasons: Vec<String>,
    quarantined_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn new(raw: RawRecord, reasons: Vec<String>) -> Self {
        Self {
            raw,
            reasons,
            quarantined_at: Utc::now(),
        }
    }

    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn quarantined_at(&self) -> DateTime<Utc> {
        self.quarantined_at
    }

    /// Reasons joined the way the quarantine tables store them.
    pub fn joined_reasons(&self) -> String {
        self.reasons.join(", ")
    }
}

/// Outcome of validating one raw record.
#[derive(Clone, Debug, PartialEq)]
pub enum Validation {
    /// Every check passed
    Valid(CleanRecord),

    /// At least one check failed
    Invalid(QuarantineRecord),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Rejection reasons, empty for a valid record.
    pub fn reasons(&self) -> &[String] {
        match self {
            Self::Valid(_) => &[],
            Self::Invalid(q) => q.reasons(),
        }
    }
}
