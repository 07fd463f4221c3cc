//! Records - runtime instances of a model schema
//!
//! A `Record` carries its attribute values, the snapshot last written to
//! storage (absent while the record is new), the in-memory values of its
//! relations and the messages of its last validation run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use super::primary_key::{is_blank, PrimaryKey};
use super::schema::ModelSchema;
use super::validation::ValidationErrors;
use crate::backends::Transaction;
use crate::error::{ModelError, ModelResult};
use crate::relationships::ModelRegistry;

/// Attribute name -> value
pub type Attributes = BTreeMap<String, Value>;

/// In-memory value of a relation
#[derive(Debug, Clone)]
pub enum RelationValue {
    /// Single related record, or none
    One(Option<Box<Record>>),
    /// Ordered related records
    Many(Vec<Record>),
}

impl RelationValue {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            RelationValue::One(Some(record)) => Some(record),
            _ => None,
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            RelationValue::Many(records) => records,
            RelationValue::One(_) => &[],
        }
    }
}

/// Key columns and stored snapshot of a record graph
#[derive(Debug, Clone)]
pub(crate) struct StoredState {
    key: Vec<(String, Option<Value>)>,
    old_attributes: Option<Attributes>,
    related: BTreeMap<String, Vec<StoredState>>,
}

/// A domain object: one row of a model, possibly not yet stored
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<ModelSchema>,
    registry: ModelRegistry,
    attributes: Attributes,
    old_attributes: Option<Attributes>,
    related: BTreeMap<String, RelationValue>,
    errors: ValidationErrors,
}

impl Record {
    /// Create a new (unsaved) record
    pub fn new(schema: Arc<ModelSchema>, registry: ModelRegistry) -> Self {
        Self {
            schema,
            registry,
            attributes: Attributes::new(),
            old_attributes: None,
            related: BTreeMap::new(),
            errors: ValidationErrors::new(),
        }
    }

    /// Create a persisted record from a stored row
    pub fn from_row(schema: Arc<ModelSchema>, registry: ModelRegistry, row: Attributes) -> Self {
        let attributes: Attributes = row
            .into_iter()
            .filter(|(name, _)| schema.has_attribute(name))
            .collect();
        Self {
            old_attributes: Some(attributes.clone()),
            attributes,
            ..Self::new(schema, registry)
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn model_name(&self) -> &str {
        self.schema.name()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute value, `Null` when unset
    pub fn attribute(&self, name: &str) -> Value {
        self.attributes.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Set one declared attribute
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        if !self.schema.has_attribute(name) {
            return Err(ModelError::UnknownAttribute(format!(
                "{}.{}",
                self.schema.name(),
                name
            )));
        }
        self.attributes.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Mass-assign attributes. Undeclared names are ignored; with
    /// `safe_only`, so are attributes outside the safe list.
    pub fn set_attributes(&mut self, values: &Attributes, safe_only: bool) {
        for (name, value) in values {
            let accepted = if safe_only {
                self.schema.is_safe_attribute(name)
            } else {
                self.schema.has_attribute(name)
            };
            if accepted {
                self.attributes.insert(name.clone(), value.clone());
            } else if safe_only {
                debug!(
                    "Failed to set unsafe attribute '{}' on '{}'",
                    name,
                    self.schema.name()
                );
            }
        }
    }

    pub fn is_new_record(&self) -> bool {
        self.old_attributes.is_none()
    }

    /// Mark the record as new, or as already stored.
    ///
    /// Marking a record as stored snapshots only its key columns, so every
    /// other attribute is written by the next update.
    pub fn set_is_new_record(&mut self, is_new: bool) {
        self.old_attributes = if is_new {
            None
        } else {
            Some(self.primary_key_values())
        };
    }

    /// Key column values (getPrimaryKey as array)
    pub fn primary_key_values(&self) -> Attributes {
        self.schema
            .primary_key_columns()
            .iter()
            .map(|column| (column.clone(), self.attribute(column)))
            .collect()
    }

    pub fn primary_key(&self) -> PrimaryKey {
        let values: Vec<Value> = self
            .schema
            .primary_key_columns()
            .iter()
            .map(|column| self.attribute(column))
            .collect();
        PrimaryKey::from_values(&values)
    }

    /// True when every key column holds a non-blank value
    pub fn has_primary_key(&self) -> bool {
        self.schema
            .primary_key_columns()
            .iter()
            .all(|column| self.get(column).map(|v| !is_blank(v)).unwrap_or(false))
    }

    /// Key of the stored row, falling back to the current key
    fn stored_key(&self) -> ModelResult<Attributes> {
        let source = self.old_attributes.as_ref().unwrap_or(&self.attributes);
        let mut key = Attributes::new();
        for column in self.schema.primary_key_columns() {
            match source.get(column).or_else(|| self.attributes.get(column)) {
                Some(value) if !is_blank(value) => {
                    key.insert(column.clone(), value.clone());
                }
                _ => return Err(ModelError::MissingPrimaryKey),
            }
        }
        Ok(key)
    }

    /// Attributes changed since the last stored snapshot
    pub fn dirty_attributes(&self, names: Option<&[String]>) -> Attributes {
        self.attributes
            .iter()
            .filter(|(name, _)| names.map_or(true, |names| names.iter().any(|n| n == *name)))
            .filter(|(name, value)| {
                self.old_attributes
                    .as_ref()
                    .and_then(|old| old.get(*name))
                    .map_or(true, |old| old != *value)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Run the schema rules, limited to `names` when given
    pub fn validate(&mut self, names: Option<&[String]>) -> bool {
        let mut errors = ValidationErrors::new();
        for rule in self.schema.rules() {
            rule.apply(|attribute| self.attributes.get(attribute), names, &mut errors);
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

    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.related.get(name)
    }

    pub fn is_relation_populated(&self, name: &str) -> bool {
        self.related.contains_key(name)
    }

    /// Set the in-memory value of a relation without touching storage
    pub fn populate_relation(&mut self, name: &str, value: RelationValue) {
        self.related.insert(name.to_string(), value);
    }

    pub(crate) fn take_relation(&mut self, name: &str) -> Option<RelationValue> {
        self.related.remove(name)
    }

    /// Single related record, if populated and set
    pub fn one(&self, name: &str) -> Option<&Record> {
        self.related.get(name).and_then(RelationValue::as_one)
    }

    pub fn one_mut(&mut self, name: &str) -> Option<&mut Record> {
        match self.related.get_mut(name) {
            Some(RelationValue::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    /// Related collection; empty when not populated
    pub fn many(&self, name: &str) -> &[Record] {
        self.related.get(name).map(RelationValue::as_many).unwrap_or(&[])
    }

    pub fn many_mut(&mut self, name: &str) -> Option<&mut Vec<Record>> {
        match self.related.get_mut(name) {
            Some(RelationValue::Many(records)) => Some(records),
            _ => None,
        }
    }

    /// Validate (optionally) and insert or update this record.
    ///
    /// Returns `Ok(false)` when validation fails; storage failures are errors.
    pub async fn save(
        &mut self,
        tx: &mut dyn Transaction,
        run_validation: bool,
        attribute_names: Option<&[String]>,
    ) -> ModelResult<bool> {
        if run_validation && !self.validate(attribute_names) {
            debug!("Validation failed for '{}', not saved", self.schema.name());
            return Ok(false);
        }
        if self.is_new_record() {
            self.insert(tx, attribute_names).await
        } else {
            self.update(tx, attribute_names).await
        }
    }

    async fn insert(
        &mut self,
        tx: &mut dyn Transaction,
        attribute_names: Option<&[String]>,
    ) -> ModelResult<bool> {
        self.touch_timestamps(true);

        let mut values = Attributes::new();
        for name in self.schema.attribute_names() {
            if !self.is_writable(name, attribute_names) {
                continue;
            }
            let Some(value) = self.attributes.get(name) else {
                continue;
            };
            if self.schema.primary_key_columns().contains(name) && is_blank(value) {
                // generated by storage
                continue;
            }
            values.insert(name.clone(), value.clone());
        }

        let stored = tx
            .insert(self.schema.table(), self.schema.primary_key_columns(), &values)
            .await?;

        for column in self.schema.primary_key_columns() {
            if let Some(value) = stored.get(column) {
                self.attributes.insert(column.clone(), value.clone());
            }
        }
        self.old_attributes = Some(self.attributes.clone());
        debug!("Inserted '{}' {}", self.schema.name(), self.primary_key());
        Ok(true)
    }

    async fn update(
        &mut self,
        tx: &mut dyn Transaction,
        attribute_names: Option<&[String]>,
    ) -> ModelResult<bool> {
        let key = self.stored_key()?;
        let mut dirty = self.dirty_attributes(attribute_names);
        if dirty.is_empty() {
            return Ok(true);
        }
        if self.schema.uses_timestamps() {
            self.touch_timestamps(false);
            dirty.insert("updated_at".to_string(), self.attribute("updated_at"));
        }

        let affected = tx.update(self.schema.table(), &key, &dirty).await?;
        if affected == 0 {
            return Err(ModelError::Database(format!(
                "'{}' {} has no stored row to update",
                self.schema.name(),
                self.primary_key()
            )));
        }
        debug!(
            "Updated '{}' {} ({} row(s))",
            self.schema.name(),
            self.primary_key(),
            affected
        );

        let old = self.old_attributes.get_or_insert_with(Attributes::new);
        old.extend(dirty);
        Ok(true)
    }

    /// Delete the stored row; the record becomes new again
    pub async fn delete(&mut self, tx: &mut dyn Transaction) -> ModelResult<u64> {
        let key = self.stored_key()?;
        let affected = tx.delete(self.schema.table(), &key).await?;
        debug!(
            "Deleted '{}' {} ({} row(s))",
            self.schema.name(),
            self.primary_key(),
            affected
        );
        self.old_attributes = None;
        Ok(affected)
    }

    /// Load the records currently stored for a relation
    pub async fn find_related(
        &self,
        tx: &mut dyn Transaction,
        relation: &str,
    ) -> ModelResult<Vec<Record>> {
        let descriptor = self.registry.relation(self.schema.name(), relation)?;
        let target = self.registry.schema(&descriptor.target)?;

        let mut filter = Attributes::new();
        for (related_column, local_column) in descriptor.link.pairs() {
            match self.attributes.get(local_column) {
                Some(value) if !value.is_null() => {
                    filter.insert(related_column.clone(), value.clone());
                }
                // Nothing can reference an unset key
                _ => return Ok(Vec::new()),
            }
        }

        let rows = tx.select(target.table(), &filter).await?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(target.clone(), self.registry.clone(), row))
            .collect())
    }

    /// Load the single record currently stored for a relation
    pub async fn find_related_one(
        &self,
        tx: &mut dyn Transaction,
        relation: &str,
    ) -> ModelResult<Option<Record>> {
        Ok(self.find_related(tx, relation).await?.into_iter().next())
    }

    /// Capture what storage knows about this record and every populated
    /// related record, so it can be put back when a save rolls back
    pub(crate) fn stored_state(&self) -> StoredState {
        StoredState {
            key: self
                .schema
                .primary_key_columns()
                .iter()
                .map(|column| (column.clone(), self.attributes.get(column).cloned()))
                .collect(),
            old_attributes: self.old_attributes.clone(),
            related: self
                .related
                .iter()
                .map(|(name, value)| {
                    let states = match value {
                        RelationValue::One(record) => record.iter().map(|r| r.stored_state()).collect(),
                        RelationValue::Many(records) => records.iter().map(Record::stored_state).collect(),
                    };
                    (name.clone(), states)
                })
                .collect(),
        }
    }

    /// Put back a state captured by [`Record::stored_state`]. Other
    /// attribute changes and validation errors are kept.
    pub(crate) fn restore_stored_state(&mut self, state: StoredState) {
        for (column, value) in state.key {
            match value {
                Some(value) => self.attributes.insert(column, value),
                None => self.attributes.remove(&column),
            };
        }
        self.old_attributes = state.old_attributes;

        for (name, states) in state.related {
            let records: Vec<&mut Record> = match self.related.get_mut(&name) {
                Some(RelationValue::One(Some(record))) => vec![record.as_mut()],
                Some(RelationValue::Many(records)) => records.iter_mut().collect(),
                _ => Vec::new(),
            };
            for (record, state) in records.into_iter().zip(states) {
                record.restore_stored_state(state);
            }
        }
    }

    fn is_writable(&self, name: &str, attribute_names: Option<&[String]>) -> bool {
        match attribute_names {
            None => true,
            Some(names) => {
                names.iter().any(|n| n == name)
                    || (self.schema.uses_timestamps() && (name == "created_at" || name == "updated_at"))
            }
        }
    }

    fn touch_timestamps(&mut self, creating: bool) {
        if !self.schema.uses_timestamps() {
            return;
        }
        let now = Value::String(Utc::now().to_rfc3339());
        if creating {
            self.attributes.insert("created_at".to_string(), now.clone());
        }
        self.attributes.insert("updated_at".to_string(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Connection, MemoryDatabase};
    use crate::model::validation::Required;
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let registry = ModelRegistry::new();
        registry.register(
            ModelSchema::new("Customer", "customers")
                .attributes(&["name", "email"])
                .safe(&["name", "email"])
                .rule(&["name"], Required),
        );
        registry
    }

    fn fields(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_set_unknown_attribute_fails() {
        let mut customer = registry().create("Customer").unwrap();
        assert!(customer.set("name", "Ada").is_ok());
        assert!(matches!(
            customer.set("nickname", "A"),
            Err(ModelError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_set_attributes_safe_only() {
        let mut customer = registry().create("Customer").unwrap();
        let values = fields(json!({"id": 9, "name": "Ada", "unknown": true}));

        customer.set_attributes(&values, true);
        assert_eq!(customer.get("name"), Some(&json!("Ada")));
        assert_eq!(customer.get("id"), None);

        customer.set_attributes(&values, false);
        assert_eq!(customer.get("id"), Some(&json!(9)));
        assert_eq!(customer.get("unknown"), None);
    }

    #[test]
    fn test_new_record_lifecycle() {
        let mut customer = registry().create("Customer").unwrap();
        assert!(customer.is_new_record());

        customer.set("id", 3).unwrap();
        customer.set("name", "Ada").unwrap();
        customer.set_is_new_record(false);
        assert!(!customer.is_new_record());

        // Only the key is considered stored
        let dirty = customer.dirty_attributes(None);
        assert_eq!(dirty.get("name"), Some(&json!("Ada")));
        assert!(!dirty.contains_key("id"));
    }

    #[test]
    fn test_validation_respects_restriction() {
        let mut customer = registry().create("Customer").unwrap();
        assert!(!customer.validate(None));
        assert!(customer.errors().get("name").is_some());

        assert!(customer.validate(Some(&["email".to_string()])));
        assert!(!customer.has_errors());
    }

    #[test]
    fn test_from_row_is_persisted() {
        let registry = registry();
        let row = fields(json!({"id": 1, "name": "Ada", "legacy_column": "x"}));
        let customer = Record::from_row(registry.schema("Customer").unwrap(), registry, row);

        assert!(!customer.is_new_record());
        assert!(customer.has_primary_key());
        assert_eq!(customer.get("legacy_column"), None);
        assert!(customer.dirty_attributes(None).is_empty());
    }

    #[test]
    fn test_relation_accessors_default_empty() {
        let customer = registry().create("Customer").unwrap();
        assert!(customer.one("profile").is_none());
        assert!(customer.many("orders").is_empty());
        assert!(!customer.is_relation_populated("orders"));
    }

    #[tokio::test]
    async fn test_restore_forgets_rolled_back_insert() {
        let db = MemoryDatabase::new();
        let mut customer = registry().create("Customer").unwrap();
        customer.set("name", "Ada").unwrap();
        let state = customer.stored_state();

        let mut tx = db.begin().await.unwrap();
        assert!(customer.save(tx.as_mut(), true, None).await.unwrap());
        tx.rollback().await.unwrap();
        assert!(!customer.is_new_record());

        customer.restore_stored_state(state);
        assert!(customer.is_new_record());
        assert_eq!(customer.get("id"), None);
        assert_eq!(customer.get("name"), Some(&json!("Ada")));
    }

    #[tokio::test]
    async fn test_update_without_stored_row_fails() {
        let db = MemoryDatabase::new();
        let mut customer = registry().create("Customer").unwrap();
        customer.set("id", 5).unwrap();
        customer.set_is_new_record(false);
        customer.set("name", "Ada").unwrap();

        let mut tx = db.begin().await.unwrap();
        let result = customer.save(tx.as_mut(), true, None).await;
        assert!(matches!(result, Err(ModelError::Database(_))));
    }
}
