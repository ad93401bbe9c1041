use std::cmp::Ordering;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Internal document id. Assigned monotonically per index, so segments
/// cover disjoint ascending ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

/// A single indexed value, as stored in doc-value columns. JSON numbers are
/// decoded into Long when integral, Double otherwise; dates are epoch
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
    Date(i64),
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Long(i))
                } else {
                    n.as_f64().map(FieldValue::Double)
                }
            }
            Value::String(s) => Some(FieldValue::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Long(i) => Some(*i as f64),
            FieldValue::Double(f) => Some(*f),
            FieldValue::Date(ms) => Some(*ms as f64),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Long(i) => Value::from(*i),
            FieldValue::Double(f) => {
                serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
            }
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Date(ms) => Value::from(*ms),
        }
    }

    /// Cross-type comparison used by range queries and sort. Numerics and
    /// dates compare numerically, strings lexicographically; mixed
    /// string/number comparisons are undefined and return None.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }
}

/// How a write becomes visible to searchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Wait for the periodic background refresh.
    #[default]
    None,
    /// Refresh immediately before acknowledging.
    Immediate,
    /// Block until the next scheduled refresh has run.
    WaitFor,
}

impl RefreshPolicy {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("true") | Some("") => RefreshPolicy::Immediate,
            Some("wait_for") => RefreshPolicy::WaitFor,
            _ => RefreshPolicy::None,
        }
    }
}

/// Outcome of a single document write, as acknowledged by the engine.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub id: String,
    pub version: i64,
    pub seq_no: i64,
    pub primary_term: i64,
    pub created: bool,
}

/// Optimistic concurrency preconditions supplied by the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteConditions {
    pub if_seq_no: Option<i64>,
    pub if_primary_term: Option<i64>,
}

impl WriteConditions {
    pub fn is_empty(&self) -> bool {
        self.if_seq_no.is_none() && self.if_primary_term.is_none()
    }
}

/// Validate a client-supplied document id: 1-512 bytes, no control chars.
pub fn validate_doc_id(id: &str) -> crate::core::error::Result<()> {
    if id.is_empty() || id.len() > 512 {
        return Err(crate::core::error::Error::illegal_argument(format!(
            "document id must be 1-512 bytes, got {} bytes",
            id.len()
        )));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(crate::core::error::Error::illegal_argument(
            "document id must not contain control characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_from_json() {
        assert_eq!(FieldValue::from_json(&Value::from(3)), Some(FieldValue::Long(3)));
        assert_eq!(FieldValue::from_json(&Value::from(2.5)), Some(FieldValue::Double(2.5)));
        assert_eq!(
            FieldValue::from_json(&Value::from("a")),
            Some(FieldValue::Str("a".to_string()))
        );
        assert_eq!(FieldValue::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_cross_type_compare() {
        let a = FieldValue::Long(2);
        let b = FieldValue::Double(2.5);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(
            FieldValue::Str("a".into()).compare(&FieldValue::Str("b".into())),
            Some(Ordering::Less)
        );
        assert_eq!(FieldValue::Str("a".into()).compare(&FieldValue::Long(1)), None);
    }

    #[test]
    fn test_doc_id_validation() {
        assert!(validate_doc_id("1").is_ok());
        assert!(validate_doc_id("").is_err());
        assert!(validate_doc_id(&"x".repeat(513)).is_err());
        assert!(validate_doc_id("a\nb").is_err());
    }

    #[test]
    fn test_refresh_policy_parse() {
        assert_eq!(RefreshPolicy::parse(Some("true")), RefreshPolicy::Immediate);
        assert_eq!(RefreshPolicy::parse(Some("")), RefreshPolicy::Immediate);
        assert_eq!(RefreshPolicy::parse(Some("wait_for")), RefreshPolicy::WaitFor);
        assert_eq!(RefreshPolicy::parse(Some("false")), RefreshPolicy::None);
        assert_eq!(RefreshPolicy::parse(None), RefreshPolicy::None);
    }
}
