//! Canonical log record
//!
//! Every ingestion path (OTLP, syslog drain) normalizes into [`Log`]. Attribute
//! values form a closed recursive variant so the storage and query layers can
//! match on them exhaustively.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{DateTime, Utc};
use fnv::FnvHasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// String-keyed attribute mapping (record level or resource level)
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Dynamically typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Int(i64),
    Double(f64),
    Array(Vec<AttributeValue>),
    Map(Attributes),
}

impl AttributeValue {
    /// Returns the inner string for `String` values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Default for AttributeValue {
    fn default() -> Self {
        Self::String(String::new())
    }
}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::String(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            Self::Bool(v) => {
                state.write_u8(1);
                v.hash(state);
            }
            Self::Bytes(v) => {
                state.write_u8(2);
                v.hash(state);
            }
            Self::Int(v) => {
                state.write_u8(3);
                v.hash(state);
            }
            Self::Double(v) => {
                state.write_u8(4);
                v.to_bits().hash(state);
            }
            Self::Array(values) => {
                state.write_u8(5);
                values.hash(state);
            }
            Self::Map(map) => {
                state.write_u8(6);
                for (key, value) in map {
                    key.hash(state);
                    value.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Double(d) => write!(f, "{}", d),
            Self::Bytes(bytes) => f.write_str(&BASE64_STANDARD.encode(bytes)),
            Self::Array(_) | Self::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Bytes(bytes) => serializer.serialize_str(&BASE64_STANDARD.encode(bytes)),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Double(d) => serializer.serialize_f64(*d),
            Self::Array(values) => values.serialize(serializer),
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

// Stored JSON loses the bytes/string distinction; bytes come back as base64 strings.
impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::default(),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::String(s),
            Value::Array(values) => Self::Array(values.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// A single log record
///
/// Immutable once built. `log_id` is assigned by the store and is `None`
/// until the record has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub observed_timestamp: DateTime<Utc>,
    pub severity_text: Option<String>,
    #[serde(default)]
    pub severity_number: i32,
    pub service_name: Option<String>,
    pub scope: Option<String>,
    #[serde(default)]
    pub body: String,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    #[serde(default)]
    pub trace_flags: i32,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub resource_attributes: Attributes,
}

impl Log {
    /// Create a record with both timestamps set and every other field empty
    pub fn new(timestamp: DateTime<Utc>, body: impl Into<String>) -> Self {
        Self {
            log_id: None,
            timestamp,
            observed_timestamp: timestamp,
            severity_text: None,
            severity_number: 0,
            service_name: None,
            scope: None,
            body: body.into(),
            trace_id: None,
            span_id: None,
            trace_flags: 0,
            attributes: Attributes::new(),
            resource_attributes: Attributes::new(),
        }
    }

    /// Digest of `resource_attributes`, the dedup key of the resource table
    pub fn resource_attributes_digest(&self) -> i64 {
        digest(&self.resource_attributes)
    }
}

/// Sum of `hash(key) ^ hash(value)` over all entries.
///
/// Not collision resistant: distinct mappings may share a digest.
pub fn digest(attributes: &Attributes) -> i64 {
    attributes
        .iter()
        .fold(0u64, |acc, (key, value)| {
            acc.wrapping_add(stable_hash(key) ^ stable_hash(value))
        }) as i64
}

fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FnvHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_digest_ignores_insertion_order() {
        let mut a = Attributes::new();
        a.insert("host.name".to_string(), "web-1".into());
        a.insert("k8s.pod".to_string(), "api-7d9".into());
        a.insert("replicas".to_string(), 3i64.into());

        let mut b = Attributes::new();
        b.insert("replicas".to_string(), 3i64.into());
        b.insert("k8s.pod".to_string(), "api-7d9".into());
        b.insert("host.name".to_string(), "web-1".into());

        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn test_digest_differs_on_value_change() {
        let a = attrs(&[("host", "web-1".into())]);
        let b = attrs(&[("host", "web-2".into())]);
        assert_ne!(digest(&a), digest(&b));
    }

    #[test]
    fn test_digest_of_empty_mapping_is_zero() {
        assert_eq!(digest(&Attributes::new()), 0);
    }

    #[test]
    fn test_digest_nested_values() {
        let nested = AttributeValue::Map(attrs(&[
            ("zone", "a".into()),
            ("ids", AttributeValue::Array(vec![1i64.into(), 2i64.into()])),
        ]));
        let a = attrs(&[("cloud", nested.clone()), ("ratio", 0.5f64.into())]);
        let b = attrs(&[("ratio", 0.5f64.into()), ("cloud", nested)]);
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn test_attribute_value_json_shape() {
        let value = AttributeValue::Map(attrs(&[
            ("s", "x".into()),
            ("b", true.into()),
            ("i", 42i64.into()),
            ("d", 1.5f64.into()),
            ("raw", AttributeValue::Bytes(vec![1, 2, 3])),
            ("list", AttributeValue::Array(vec!["a".into(), 2i64.into()])),
        ]));

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "s": "x",
                "b": true,
                "i": 42,
                "d": 1.5,
                "raw": "AQID",
                "list": ["a", 2]
            })
        );
    }

    #[test]
    fn test_attribute_value_from_json() {
        let parsed: Attributes =
            serde_json::from_str(r#"{"n":7,"f":2.25,"ok":false,"none":null,"m":{"k":"v"}}"#)
                .unwrap();
        assert_eq!(parsed["n"], AttributeValue::Int(7));
        assert_eq!(parsed["f"], AttributeValue::Double(2.25));
        assert_eq!(parsed["ok"], AttributeValue::Bool(false));
        assert_eq!(parsed["none"], AttributeValue::String(String::new()));
        assert_eq!(
            parsed["m"],
            AttributeValue::Map(attrs(&[("k", "v".into())]))
        );
    }

    #[test]
    fn test_display_coerces_to_string() {
        assert_eq!(AttributeValue::from("plain").to_string(), "plain");
        assert_eq!(AttributeValue::from(12i64).to_string(), "12");
        assert_eq!(AttributeValue::from(true).to_string(), "true");
        assert_eq!(
            AttributeValue::Array(vec!["a".into(), 1i64.into()]).to_string(),
            r#"["a",1]"#
        );
    }

    #[test]
    fn test_log_serializes_camel_case() {
        let ts = DateTime::parse_from_rfc3339("2024-08-09T01:01:11Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut log = Log::new(ts, "hello");
        log.service_name = Some("blog".to_string());
        log.trace_flags = 1;

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["serviceName"], "blog");
        assert_eq!(json["observedTimestamp"], "2024-08-09T01:01:11Z");
        assert_eq!(json["traceFlags"], 1);
        assert!(json.get("logId").is_none());
    }
}
