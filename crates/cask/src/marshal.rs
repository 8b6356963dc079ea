//! Call arguments and their encoding for the guest.
//!
//! Host and guest do not share a value representation, so call arguments
//! cross the boundary as a single JSON string. [`encode`] produces that
//! string from a [`Value`] tree; the prelude's `recv` decodes it with
//! `JSON.parse` on the guest side.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};

/// Largest integer a JavaScript number represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A host-side value tree passed as call arguments.
///
/// Only sequences, string-keyed mappings and scalars can be encoded for the
/// guest. [`Value::Blob`] exists so hosts can hold raw bytes in the same
/// tree, but it has no guest representation and fails to encode.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// JSON `null`
    #[default]
    Null,
    /// A boolean
    Bool(bool),
    /// A number; must be finite to be encoded
    Number(f64),
    /// A string
    String(String),
    /// An ordered sequence, encoded as an array
    List(Vec<Value>),
    /// A mapping with unique string keys, encoded as an object
    Map(BTreeMap<String, Value>),
    /// Raw bytes; not encodable
    Blob(Vec<u8>),
}

impl Value {
    /// Short name of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Blob(_) => "blob",
        }
    }
}

/// Encode a value tree as the JSON text handed to the guest entry point.
///
/// Fails without producing output if any node cannot be represented.
pub fn encode(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if !n.is_finite() => Err(S::Error::custom(format!(
                "cannot encode non-finite number {}",
                n
            ))),
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                // Exact conversion: integral and within the safe range.
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Blob(bytes) => Err(S::Error::custom(format!(
                "cannot encode {}-byte blob as a call argument",
                bytes.len()
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            // Always Some without serde_json's arbitrary_precision feature.
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match encode(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "<unencodable {}>", self.kind()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_tree() -> Value {
        Value::from_iter([
            ("key", Value::from("k1")),
            ("count", Value::from(3)),
            ("ratio", Value::from(0.25)),
            ("flags", Value::from(vec![true, false])),
            ("missing", Value::Null),
            (
                "nested",
                Value::from_iter([("list", Value::from(vec!["a", "b"]))]),
            ),
        ])
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&Value::Null).unwrap(), "null");
        assert_eq!(encode(&Value::from(true)).unwrap(), "true");
        assert_eq!(encode(&Value::from("hi \"there\"")).unwrap(), r#""hi \"there\"""#);
        assert_eq!(encode(&Value::from(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn test_integral_numbers_have_no_fraction() {
        assert_eq!(encode(&Value::from(42)).unwrap(), "42");
        assert_eq!(encode(&Value::from(-7.0)).unwrap(), "-7");
        // Past the safe range the float encoding is kept.
        assert_eq!(encode(&Value::Number(1e300)).unwrap(), "1e+300");
    }

    #[test]
    fn test_sequences_and_mappings() {
        let value = Value::from_iter([("b", Value::from(vec![1, 2])), ("a", Value::Null)]);
        assert_eq!(encode(&value).unwrap(), r#"{"a":null,"b":[1,2]}"#);
    }

    #[test]
    fn test_blob_fails_to_encode() {
        let value = Value::from_iter([("payload", Value::Blob(vec![0, 1, 2]))]);

        let err = encode(&value).unwrap_err();
        assert!(err.to_string().contains("3-byte blob"), "{}", err);
    }

    #[test]
    fn test_non_finite_fails_to_encode() {
        let value = Value::from(vec![Value::Number(f64::NAN)]);
        assert!(encode(&value).is_err());

        let value = Value::Number(f64::INFINITY);
        assert!(encode(&value).is_err());
    }

    #[test]
    fn test_decode_reconstructs_tree() {
        let tree = sample_tree();

        let json = encode(&tree).unwrap();
        let decoded: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_decode_reconstructs_deeply_nested_tree() {
        let mut tree = Value::from("leaf");
        for depth in 0..32 {
            tree = if depth % 2 == 0 {
                Value::from(vec![tree, Value::from(depth)])
            } else {
                Value::from_iter([(format!("level{}", depth), tree)])
            };
        }

        let decoded: Value = serde_json::from_str(&encode(&tree).unwrap()).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_from_json_value() {
        let value = Value::from(serde_json::json!({"a": [1, "x", null], "b": {"c": false}}));

        assert_eq!(
            value,
            Value::from_iter([
                (
                    "a",
                    Value::List(vec![Value::from(1), Value::from("x"), Value::Null])
                ),
                ("b", Value::from_iter([("c", false)])),
            ])
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1,2]");
        assert_eq!(Value::Blob(vec![]).to_string(), "<unencodable blob>");
    }
}
