//! Form schemas - attributes, rules and nested forms of one form type

use std::sync::Arc;

use cascade_orm::{Rule, Validator};
use serde::{Deserialize, Serialize};

/// How many child forms a nesting holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nesting {
    One,
    Many,
}

/// A child form declared on a form attribute
#[derive(Debug, Clone)]
pub struct NestedForm {
    pub attribute: String,
    pub nesting: Nesting,
    pub schema: Arc<FormSchema>,
}

/// Declaration of a form type
#[derive(Debug, Clone)]
pub struct FormSchema {
    name: String,
    attributes: Vec<String>,
    safe_attributes: Option<Vec<String>>,
    rules: Vec<Rule>,
    nested: Vec<NestedForm>,
}

impl FormSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            safe_attributes: None,
            rules: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn attributes(mut self, names: &[&str]) -> Self {
        for name in names {
            if !self.attributes.iter().any(|a| a == name) {
                self.attributes.push(name.to_string());
            }
        }
        self
    }

    /// Restrict mass assignment; every attribute is safe otherwise
    pub fn safe(mut self, names: &[&str]) -> Self {
        self.safe_attributes = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn rule<V: Validator + 'static>(mut self, attributes: &[&str], validator: V) -> Self {
        self.rules.push(Rule::new(attributes, validator));
        self
    }

    pub fn has_one(self, attribute: &str, schema: impl Into<Arc<FormSchema>>) -> Self {
        self.nest(attribute, Nesting::One, schema.into())
    }

    pub fn has_many(self, attribute: &str, schema: impl Into<Arc<FormSchema>>) -> Self {
        self.nest(attribute, Nesting::Many, schema.into())
    }

    fn nest(mut self, attribute: &str, nesting: Nesting, schema: Arc<FormSchema>) -> Self {
        self.nested.retain(|n| n.attribute != attribute);
        self.nested.push(NestedForm {
            attribute: attribute.to_string(),
            nesting,
            schema,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attributes
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    pub fn is_safe_attribute(&self, name: &str) -> bool {
        match &self.safe_attributes {
            Some(safe) => safe.iter().any(|a| a == name),
            None => self.has_attribute(name),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn nested_forms(&self) -> &[NestedForm] {
        &self.nested
    }

    pub fn nested_form(&self, attribute: &str) -> Option<&NestedForm> {
        self.nested.iter().find(|n| n.attribute == attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_orm::Required;

    #[test]
    fn test_safe_defaults_to_attributes() {
        let schema = FormSchema::new("Item").attributes(&["sku", "qty"]);
        assert!(schema.is_safe_attribute("sku"));
        assert!(!schema.is_safe_attribute("price"));

        let restricted = schema.safe(&["qty"]);
        assert!(!restricted.is_safe_attribute("sku"));
        assert!(restricted.is_safe_attribute("qty"));
    }

    #[test]
    fn test_nesting_replaces_same_attribute() {
        let item = Arc::new(FormSchema::new("Item").rule(&["sku"], Required));
        let schema = FormSchema::new("Order")
            .has_one("items", item.clone())
            .has_many("items", item);

        assert_eq!(schema.nested_forms().len(), 1);
        assert_eq!(schema.nested_form("items").unwrap().nesting, Nesting::Many);
        assert!(schema.nested_form("customer").is_none());
    }
}
