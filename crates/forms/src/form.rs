//! Bound forms
//!
//! A [`Form`] holds the values of its own attributes and one child form (or
//! an ordered, keyed list of them) per nesting declared by its schema.
//! Children are named after their position in the parent, so a line item
//! of an order form is named `Order[items][0]`.

use std::collections::BTreeMap;
use std::sync::Arc;

use cascade_orm::{
    AssignTo, AssignmentSource, Attributes, ModelError, ModelResult, Record, RelationAssignment,
    ValidationErrors,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::schema::{FormSchema, Nesting};

/// Current value of a nested form attribute
#[derive(Debug, Clone)]
pub enum NestedValue {
    One(Box<Form>),
    /// Child forms keyed by their input key, in input order
    Many(Vec<(String, Form)>),
}

#[derive(Debug, Clone)]
pub struct Form {
    schema: Arc<FormSchema>,
    form_name: Option<String>,
    values: Attributes,
    nested: BTreeMap<String, NestedValue>,
    errors: ValidationErrors,
}

impl Form {
    /// Create an empty form with a blank child for every `one` nesting
    pub fn new(schema: impl Into<Arc<FormSchema>>) -> Self {
        Self::named(schema.into(), None)
    }

    fn named(schema: Arc<FormSchema>, form_name: Option<String>) -> Self {
        let mut form = Self {
            schema,
            form_name,
            values: Attributes::new(),
            nested: BTreeMap::new(),
            errors: ValidationErrors::new(),
        };
        form.reset_nested();
        form
    }

    fn reset_nested(&mut self) {
        let mut nested = BTreeMap::new();
        for child in self.schema.nested_forms() {
            let value = match child.nesting {
                Nesting::One => NestedValue::One(Box::new(Self::named(
                    child.schema.clone(),
                    Some(self.input_name(&child.attribute)),
                ))),
                Nesting::Many => NestedValue::Many(Vec::new()),
            };
            nested.insert(child.attribute.clone(), value);
        }
        self.nested = nested;
    }

    pub fn schema(&self) -> &Arc<FormSchema> {
        &self.schema
    }

    /// Name used to scope input data; defaults to the schema name
    pub fn form_name(&self) -> &str {
        self.form_name.as_deref().unwrap_or_else(|| self.schema.name())
    }

    /// Rename the form; existing `one` children are renamed with it
    pub fn set_form_name(&mut self, name: impl Into<String>) {
        self.form_name = Some(name.into());
        let names: Vec<(String, String)> = self
            .nested
            .keys()
            .map(|attribute| (attribute.clone(), self.input_name(attribute)))
            .collect();
        for (attribute, name) in names {
            match self.nested.get_mut(&attribute) {
                Some(NestedValue::One(child)) => child.set_form_name(name),
                Some(NestedValue::Many(children)) => {
                    for (key, child) in children.iter_mut() {
                        child.set_form_name(format!("{}[{}]", name, key));
                    }
                }
                None => {}
            }
        }
    }

    /// Input name of an attribute, e.g. `Order[note]`
    pub fn input_name(&self, attribute: &str) -> String {
        match self.form_name() {
            "" => attribute.to_string(),
            form => format!("{}[{}]", form, attribute),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.values
    }

    /// Set one declared attribute
    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) -> ModelResult<()> {
        if !self.schema.has_attribute(attribute) {
            return Err(ModelError::UnknownAttribute(format!(
                "{}.{}",
                self.schema.name(),
                attribute
            )));
        }
        self.values.insert(attribute.to_string(), value.into());
        Ok(())
    }

    pub fn nested(&self, attribute: &str) -> Option<&NestedValue> {
        self.nested.get(attribute)
    }

    pub fn one(&self, attribute: &str) -> Option<&Form> {
        match self.nested.get(attribute) {
            Some(NestedValue::One(child)) => Some(child),
            _ => None,
        }
    }

    pub fn one_mut(&mut self, attribute: &str) -> Option<&mut Form> {
        match self.nested.get_mut(attribute) {
            Some(NestedValue::One(child)) => Some(child),
            _ => None,
        }
    }

    pub fn many(&self, attribute: &str) -> &[(String, Form)] {
        match self.nested.get(attribute) {
            Some(NestedValue::Many(children)) => children,
            _ => &[],
        }
    }

    /// Bind request data scoped by the form name.
    ///
    /// Returns `false` when the data carries nothing for this form.
    pub fn load(&mut self, data: &Value) -> bool {
        let scope = match self.form_name() {
            "" => Some(data),
            name => data.get(name),
        };
        match scope {
            Some(Value::Object(fields)) => {
                self.set_attributes(fields);
                true
            }
            _ => false,
        }
    }

    /// Mass-assign safe attributes and nested form data
    pub fn set_attributes(&mut self, fields: &Map<String, Value>) {
        for (name, value) in fields {
            if self.schema.nested_form(name).is_some() {
                self.bind_nested(name, value);
            } else if self.schema.is_safe_attribute(name) {
                self.values.insert(name.clone(), value.clone());
            } else {
                debug!(
                    "Failed to set unsafe attribute '{}' on form '{}'",
                    name,
                    self.form_name()
                );
            }
        }
    }

    fn bind_nested(&mut self, attribute: &str, value: &Value) {
        let Some(declared) = self.schema.nested_form(attribute) else {
            return;
        };
        match declared.nesting {
            Nesting::One => {
                if let (Some(child), Value::Object(fields)) = (self.one_mut(attribute), value) {
                    child.set_attributes(fields);
                }
            }
            Nesting::Many => {
                let entries: Vec<(String, &Value)> = match value {
                    Value::Array(items) => items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| (index.to_string(), item))
                        .collect(),
                    Value::Object(items) => items.iter().map(|(key, item)| (key.clone(), item)).collect(),
                    _ => Vec::new(),
                };
                let schema = declared.schema.clone();
                let base = self.input_name(attribute);
                let children = entries
                    .into_iter()
                    .map(|(key, item)| {
                        let mut child =
                            Self::named(schema.clone(), Some(format!("{}[{}]", base, key)));
                        if let Value::Object(fields) = item {
                            child.set_attributes(fields);
                        }
                        (key, child)
                    })
                    .collect();
                self.nested.insert(attribute.to_string(), NestedValue::Many(children));
            }
        }
    }

    /// Fill the form from a record and its populated relations
    pub fn assign_from(&mut self, record: &Record) {
        let fields: Map<String, Value> = record
            .attributes()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        self.set_attributes_only(&fields);

        let nestings: Vec<(String, Nesting, Arc<FormSchema>)> = self
            .schema
            .nested_forms()
            .iter()
            .map(|n| (n.attribute.clone(), n.nesting, n.schema.clone()))
            .collect();

        for (attribute, nesting, schema) in nestings {
            match nesting {
                Nesting::One => {
                    if let (Some(child), Some(related)) =
                        (self.one_mut(&attribute), record.one(&attribute))
                    {
                        child.assign_from(related);
                    }
                }
                Nesting::Many => {
                    let base = self.input_name(&attribute);
                    let children = record
                        .many(&attribute)
                        .iter()
                        .enumerate()
                        .map(|(index, related)| {
                            let mut child =
                                Self::named(schema.clone(), Some(format!("{}[{}]", base, index)));
                            child.assign_from(related);
                            (index.to_string(), child)
                        })
                        .collect();
                    self.nested.insert(attribute, NestedValue::Many(children));
                }
            }
        }
    }

    /// Safe attribute assignment without touching nested forms
    fn set_attributes_only(&mut self, fields: &Map<String, Value>) {
        for (name, value) in fields {
            if self.schema.is_safe_attribute(name) {
                self.values.insert(name.clone(), value.clone());
            }
        }
    }

    /// Validate own attributes and every nested form.
    ///
    /// An invalid child adds an error on the nesting attribute.
    pub fn validate(&mut self) -> bool {
        let mut errors = ValidationErrors::new();
        for rule in self.schema.rules() {
            rule.apply(|attribute| self.values.get(attribute), None, &mut errors);
        }

        for (attribute, value) in self.nested.iter_mut() {
            let valid = match value {
                NestedValue::One(child) => child.validate(),
                NestedValue::Many(children) => children
                    .iter_mut()
                    .fold(true, |valid, (_, child)| child.validate() && valid),
            };
            if !valid {
                errors.add(attribute.clone(), format!("{} is invalid.", attribute));
            }
        }

        self.errors = errors;
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl AssignTo for Form {
    /// Write safe attributes into the record, then assign every nested form
    /// to the relation of the same name
    fn assign_to(&self, record: &mut Record) -> ModelResult<()> {
        record.set_attributes(&self.values, true);

        for (attribute, value) in &self.nested {
            let assignment = match value {
                NestedValue::One(child) => {
                    RelationAssignment::Single(AssignmentSource::form((**child).clone()))
                }
                NestedValue::Many(children) => RelationAssignment::List(
                    children
                        .iter()
                        .map(|(_, child)| AssignmentSource::form(child.clone()))
                        .collect(),
                ),
            };
            record.assign_relation(attribute, assignment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_orm::Required;
    use serde_json::json;

    fn order_schema() -> Arc<FormSchema> {
        let item = FormSchema::new("Item")
            .attributes(&["id", "sku"])
            .rule(&["sku"], Required);
        let customer = FormSchema::new("Customer")
            .attributes(&["name"])
            .rule(&["name"], Required);
        Arc::new(
            FormSchema::new("Order")
                .attributes(&["note", "status"])
                .safe(&["note"])
                .has_one("customer", customer)
                .has_many("items", item),
        )
    }

    #[test]
    fn test_new_form_initialises_nested() {
        let form = Form::new(order_schema());
        assert_eq!(form.form_name(), "Order");
        assert_eq!(form.one("customer").unwrap().form_name(), "Order[customer]");
        assert!(form.many("items").is_empty());
    }

    #[test]
    fn test_load_binds_scoped_data() {
        let mut form = Form::new(order_schema());
        let loaded = form.load(&json!({
            "Order": {
                "note": "rush",
                "status": "paid",
                "customer": {"name": "Ada"},
                "items": [{"sku": "a"}, {"sku": "b"}]
            }
        }));

        assert!(loaded);
        assert_eq!(form.get("note"), Some(&json!("rush")));
        assert_eq!(form.get("status"), None);
        assert_eq!(form.one("customer").unwrap().get("name"), Some(&json!("Ada")));

        let items = form.many("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].0, "1");
        assert_eq!(items[1].1.form_name(), "Order[items][1]");
    }

    #[test]
    fn test_load_without_scope_returns_false() {
        let mut form = Form::new(order_schema());
        assert!(!form.load(&json!({"Other": {"note": "x"}})));
        assert!(!form.load(&json!("Order")));
    }

    #[test]
    fn test_many_keeps_input_keys_and_drops_non_collections() {
        let mut form = Form::new(order_schema());
        let mut fields = Map::new();
        fields.insert("items".to_string(), json!({"new1": {"sku": "x"}, "7": {"sku": "y"}}));
        form.set_attributes(&fields);

        let keys: Vec<&str> = form.many("items").iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["7", "new1"]);

        fields.insert("items".to_string(), json!("none"));
        form.set_attributes(&fields);
        assert!(form.many("items").is_empty());
    }

    #[test]
    fn test_validate_reports_invalid_nesting() {
        let mut form = Form::new(order_schema());
        form.load(&json!({"Order": {"customer": {"name": "Ada"}, "items": [{"sku": "a"}, {"sku": ""}]}}));

        assert!(!form.validate());
        assert!(form.errors().get("items").is_some());
        assert!(form.errors().get("customer").is_none());
        assert!(form.many("items")[1].1.errors().get("sku").is_some());
    }

    #[test]
    fn test_set_form_name_renames_children() {
        let mut form = Form::new(order_schema());
        form.load(&json!({"Order": {"items": [{"sku": "a"}]}}));
        form.set_form_name("checkout");

        assert_eq!(form.input_name("note"), "checkout[note]");
        assert_eq!(form.one("customer").unwrap().form_name(), "checkout[customer]");
        assert_eq!(form.many("items")[0].1.form_name(), "checkout[items][0]");
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut form = Form::new(order_schema());
        assert!(form.set("status", "open").is_ok());
        assert!(form.set("colour", "red").is_err());
    }
}
