//! Primary Key System - Composite keys usable directly as map keys
//!
//! A `PrimaryKey` is the ordered list of a record's key column values.
//! Integer-like text normalises to `Integer` so that a key submitted as
//! `"7"` matches a stored `7`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One column of a primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    /// Unset column
    Null,
    /// Integer key (also produced from integer-like text)
    Integer(i64),
    /// UUID key (produced from UUID-shaped text)
    Uuid(Uuid),
    /// Any other text, or a non-integer number in its text form
    Text(String),
    /// Boolean key column
    Bool(bool),
}

impl KeyValue {
    /// Normalise an attribute value into a hashable key part
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => KeyValue::Null,
            Value::Bool(b) => KeyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => KeyValue::Integer(i),
                None => KeyValue::Text(n.to_string()),
            },
            Value::String(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    KeyValue::Integer(i)
                } else if let Ok(uuid) = Uuid::parse_str(s) {
                    KeyValue::Uuid(uuid)
                } else {
                    KeyValue::Text(s.clone())
                }
            }
            other => KeyValue::Text(other.to_string()),
        }
    }

    /// Check if this is a valid (non-default) key part
    pub fn is_valid(&self) -> bool {
        match self {
            KeyValue::Null => false,
            KeyValue::Integer(id) => *id != 0,
            KeyValue::Uuid(uuid) => !uuid.is_nil(),
            KeyValue::Text(s) => !s.is_empty(),
            KeyValue::Bool(b) => *b,
        }
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Null => write!(f, "null"),
            KeyValue::Integer(id) => write!(f, "{}", id),
            KeyValue::Uuid(id) => write!(f, "{}", id),
            KeyValue::Text(s) => write!(f, "{}", s),
            KeyValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Ordered composite primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey(Vec<KeyValue>);

impl PrimaryKey {
    /// Build a key from values listed in key-column order
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        PrimaryKey(values.into_iter().map(KeyValue::from_value).collect())
    }

    pub fn parts(&self) -> &[KeyValue] {
        &self.0
    }

    /// A key is complete when every column holds a non-blank value
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(KeyValue::is_valid)
    }
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Empty-value rule used for key completeness checks
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Compare two attribute values the way stored keys are compared
pub fn values_match(left: &Value, right: &Value) -> bool {
    left == right || KeyValue::from_value(left) == KeyValue::from_value(right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_primary_key_display() {
        let key = PrimaryKey::from_values(&[json!(12), json!("en")]);
        assert_eq!(key.to_string(), "12,en");
    }

    #[test]
    fn test_integer_like_text_matches_integer() {
        let submitted = PrimaryKey::from_values(&[json!("7")]);
        let stored = PrimaryKey::from_values(&[json!(7)]);
        assert_eq!(submitted, stored);

        let mut set = HashSet::new();
        set.insert(stored);
        assert!(set.contains(&submitted));
    }

    #[test]
    fn test_uuid_keys_normalise() {
        let raw = "550e8400-e29b-41d4-a716-446655440000";
        let key = KeyValue::from_value(&json!(raw));
        assert_eq!(key, KeyValue::Uuid(Uuid::parse_str(raw).unwrap()));
        assert!(!KeyValue::Uuid(Uuid::nil()).is_valid());
    }

    #[test]
    fn test_primary_key_validation() {
        assert!(PrimaryKey::from_values(&[json!(1), json!(2)]).is_valid());
        assert!(!PrimaryKey::from_values(&[json!(1), Value::Null]).is_valid());
        assert!(!PrimaryKey::from_values(&[json!(0)]).is_valid());
        assert!(!PrimaryKey::from_values(&[]).is_valid());
    }

    #[test]
    fn test_blank_values() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("")));
        assert!(is_blank(&json!("0")));
        assert!(is_blank(&json!(0)));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!("a")));
        assert!(!is_blank(&json!(3)));
    }

    #[test]
    fn test_values_match_across_representations() {
        assert!(values_match(&json!(5), &json!("5")));
        assert!(!values_match(&json!(5), &json!(6)));
        assert!(values_match(&json!("x"), &json!("x")));
    }
}
