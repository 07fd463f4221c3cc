//! Model schemas - per-type declaration of table, keys, attributes and relations

use crate::relationships::metadata::{Cardinality, LinkMapping, RelationDescriptor};

use super::validation::{Rule, Validator};

/// Static description of one model type.
///
/// Built once at startup and registered with a
/// [`ModelRegistry`](crate::relationships::ModelRegistry).
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    table: String,
    primary_key: Vec<String>,
    attributes: Vec<String>,
    safe_attributes: Option<Vec<String>>,
    relations: Vec<RelationDescriptor>,
    rules: Vec<Rule>,
    timestamps: bool,
    cascading: bool,
}

impl ModelSchema {
    /// Create a schema with an `id` primary key
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: vec!["id".to_string()],
            attributes: vec!["id".to_string()],
            safe_attributes: None,
            relations: Vec::new(),
            rules: Vec::new(),
            timestamps: false,
            cascading: true,
        }
    }

    /// Replace the primary key columns (also declared as attributes)
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.attributes.retain(|a| !self.primary_key.contains(a));
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        for column in columns.iter().rev() {
            if !self.attributes.iter().any(|a| a == column) {
                self.attributes.insert(0, column.to_string());
            }
        }
        self
    }

    /// Declare attribute columns
    pub fn attributes(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if !self.attributes.iter().any(|a| a == column) {
                self.attributes.push(column.to_string());
            }
        }
        self
    }

    /// Restrict mass assignment with `safe_only` to these attributes
    pub fn safe(mut self, columns: &[&str]) -> Self {
        self.safe_attributes = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Add a validation rule
    pub fn rule<V: Validator + 'static>(mut self, attributes: &[&str], validator: V) -> Self {
        self.rules.push(Rule::new(attributes, validator));
        self
    }

    /// Maintain `created_at` / `updated_at` on save
    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self.attributes(&["created_at", "updated_at"])
    }

    /// Whether saves reached through a relation recurse into this type's relations
    pub fn cascading(mut self, cascading: bool) -> Self {
        self.cascading = cascading;
        self
    }

    /// Declare a single-record relation
    pub fn has_one<I, R, L>(self, name: &str, target: &str, link: I) -> Self
    where
        I: IntoIterator<Item = (R, L)>,
        R: Into<String>,
        L: Into<String>,
    {
        self.relation(RelationDescriptor::new(
            name,
            Cardinality::One,
            target,
            LinkMapping::new(link),
        ))
    }

    /// Declare a collection relation
    pub fn has_many<I, R, L>(self, name: &str, target: &str, link: I) -> Self
    where
        I: IntoIterator<Item = (R, L)>,
        R: Into<String>,
        L: Into<String>,
    {
        self.relation(RelationDescriptor::new(
            name,
            Cardinality::Many,
            target,
            LinkMapping::new(link),
        ))
    }

    pub fn relation(mut self, descriptor: RelationDescriptor) -> Self {
        self.relations.push(descriptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attributes
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Attributes accepted by `set_attributes(.., safe_only = true)`
    pub fn safe_attribute_names(&self) -> &[String] {
        self.safe_attributes.as_deref().unwrap_or(&self.attributes)
    }

    pub fn is_safe_attribute(&self, name: &str) -> bool {
        self.safe_attribute_names().iter().any(|a| a == name)
    }

    /// Declared relations, in declaration order
    pub fn declared_relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn is_cascading(&self) -> bool {
        self.cascading
    }

    /// True when `columns` is exactly this model's primary key set
    pub fn is_primary_key(&self, columns: &[&str]) -> bool {
        columns.len() == self.primary_key.len()
            && self
                .primary_key
                .iter()
                .all(|pk| columns.iter().any(|c| c == pk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::validation::Required;

    #[test]
    fn test_schema_builder() {
        let schema = ModelSchema::new("Customer", "customers")
            .attributes(&["name", "email"])
            .rule(&["name"], Required)
            .has_many("orders", "Order", [("customer_id", "id")]);

        assert_eq!(schema.name(), "Customer");
        assert_eq!(schema.table(), "customers");
        assert_eq!(schema.attribute_names(), ["id", "name", "email"]);
        assert_eq!(schema.declared_relations().len(), 1);
        assert_eq!(schema.rules().len(), 1);
        assert!(schema.is_cascading());
    }

    #[test]
    fn test_composite_primary_key() {
        let schema = ModelSchema::new("Translation", "translations")
            .primary_key(&["post_id", "lang"])
            .attributes(&["title"]);

        assert_eq!(schema.primary_key_columns(), ["post_id", "lang"]);
        assert_eq!(schema.attribute_names(), ["post_id", "lang", "title"]);
        assert!(schema.is_primary_key(&["lang", "post_id"]));
        assert!(!schema.is_primary_key(&["post_id"]));
        assert!(!schema.has_attribute("id"));
    }

    #[test]
    fn test_safe_attributes_default_to_all() {
        let open = ModelSchema::new("Tag", "tags").attributes(&["label"]);
        assert!(open.is_safe_attribute("id"));

        let guarded = open.safe(&["label"]);
        assert!(guarded.is_safe_attribute("label"));
        assert!(!guarded.is_safe_attribute("id"));
    }

    #[test]
    fn test_timestamps_declare_columns() {
        let schema = ModelSchema::new("Post", "posts").with_timestamps();
        assert!(schema.uses_timestamps());
        assert!(schema.has_attribute("created_at"));
        assert!(schema.has_attribute("updated_at"));
    }
}
