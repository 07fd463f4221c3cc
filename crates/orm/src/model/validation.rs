//! Attribute validation rules shared by records and forms

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single check applied to one attribute value
pub trait Validator: Send + Sync {
    /// Return an error message when the value is invalid
    fn check(&self, attribute: &str, value: Option<&Value>) -> Option<String>;

    /// Get the validation rule name
    fn rule_name(&self) -> &'static str;
}

/// Value must be present and not blank
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Validator for Required {
    fn check(&self, attribute: &str, value: Option<&Value>) -> Option<String> {
        match value {
            None | Some(Value::Null) => Some(format!("{} cannot be blank.", attribute)),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Some(format!("{} cannot be blank.", attribute))
            }
            Some(Value::Array(items)) if items.is_empty() => {
                Some(format!("{} cannot be blank.", attribute))
            }
            Some(_) => None,
        }
    }

    fn rule_name(&self) -> &'static str {
        "required"
    }
}

/// String value must not exceed a character count
#[derive(Debug, Clone, Copy)]
pub struct MaxLength(pub usize);

impl Validator for MaxLength {
    fn check(&self, attribute: &str, value: Option<&Value>) -> Option<String> {
        match value {
            Some(Value::String(s)) if s.chars().count() > self.0 => Some(format!(
                "{} should contain at most {} characters.",
                attribute, self.0
            )),
            _ => None,
        }
    }

    fn rule_name(&self) -> &'static str {
        "max_length"
    }
}

type CheckFn = dyn Fn(&str, Option<&Value>) -> Option<String> + Send + Sync;

/// Closure-backed rule
#[derive(Clone)]
pub struct Custom(Arc<CheckFn>);

impl Custom {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&str, Option<&Value>) -> Option<String> + Send + Sync + 'static,
    {
        Custom(Arc::new(check))
    }
}

impl Validator for Custom {
    fn check(&self, attribute: &str, value: Option<&Value>) -> Option<String> {
        (self.0)(attribute, value)
    }

    fn rule_name(&self) -> &'static str {
        "custom"
    }
}

/// A validator bound to the attributes it checks
#[derive(Clone)]
pub struct Rule {
    pub attributes: Vec<String>,
    pub validator: Arc<dyn Validator>,
}

impl Rule {
    pub fn new<V: Validator + 'static>(attributes: &[&str], validator: V) -> Self {
        Self {
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            validator: Arc::new(validator),
        }
    }

    /// Run this rule against an attribute lookup, limited to `only` when given
    pub fn apply<'v, F>(&self, lookup: F, only: Option<&[String]>, errors: &mut ValidationErrors)
    where
        F: Fn(&str) -> Option<&'v Value>,
    {
        for attribute in &self.attributes {
            if let Some(only) = only {
                if !only.iter().any(|name| name == attribute) {
                    continue;
                }
            }
            if let Some(message) = self.validator.check(attribute, lookup(attribute)) {
                errors.add(attribute, message);
            }
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("attributes", &self.attributes)
            .field("validator", &self.validator.rule_name())
            .finish()
    }
}

/// Validation messages keyed by attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&[String]> {
        self.errors.get(attribute).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_rule() {
        assert!(Required.check("name", Some(&json!("Ada"))).is_none());
        assert_eq!(
            Required.check("name", Some(&json!(""))),
            Some("name cannot be blank.".to_string())
        );
        assert!(Required.check("name", None).is_some());
        assert!(Required.check("qty", Some(&json!(0))).is_none());
    }

    #[test]
    fn test_max_length_rule() {
        assert!(MaxLength(3).check("code", Some(&json!("abcd"))).is_some());
        assert!(MaxLength(3).check("code", Some(&json!("abc"))).is_none());
    }

    #[test]
    fn test_rule_respects_restriction() {
        let rule = Rule::new(&["name", "email"], Required);
        let values = std::collections::HashMap::<String, Value>::new();
        let mut errors = ValidationErrors::new();

        rule.apply(|n| values.get(n), Some(&["email".to_string()]), &mut errors);

        assert!(errors.get("name").is_none());
        assert_eq!(errors.get("email").map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_custom_rule() {
        let positive = Custom::new(|attribute, value| match value.and_then(Value::as_i64) {
            Some(n) if n > 0 => None,
            _ => Some(format!("{} must be positive.", attribute)),
        });
        assert!(positive.check("qty", Some(&json!(2))).is_none());
        assert!(positive.check("qty", Some(&json!(-1))).is_some());
    }
}
