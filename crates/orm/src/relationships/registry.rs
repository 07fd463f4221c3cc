//! Relationship Registry - model schemas and the per-type relation cache

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::metadata::RelationDescriptor;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelSchema, Record};

/// Thread-safe registry of model schemas.
///
/// Cloning is cheap; clones share the same schemas and cache.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    /// Model name -> schema
    schemas: Arc<DashMap<String, Arc<ModelSchema>>>,

    /// Model name -> validated relation descriptors
    relations: Arc<DashMap<String, Arc<[RelationDescriptor]>>>,
}

impl ModelRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a model schema
    pub fn register(&self, schema: ModelSchema) -> Arc<ModelSchema> {
        let name = schema.name().to_string();
        let schema = Arc::new(schema);
        self.schemas.insert(name.clone(), schema.clone());
        // Any cached resolution may point at the replaced schema
        self.relations.clear();
        debug!("Registered model schema '{}'", name);
        schema
    }

    /// Get a schema by model name
    pub fn schema(&self, model: &str) -> ModelResult<Arc<ModelSchema>> {
        self.schemas
            .get(model)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ModelError::Reflection(format!("model '{}' is not registered", model)))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.schemas.contains_key(model)
    }

    /// Build a blank, new record of the given model
    pub fn create(&self, model: &str) -> ModelResult<Record> {
        Ok(Record::new(self.schema(model)?, self.clone()))
    }

    /// Resolve and validate the relations declared by a model.
    ///
    /// Computed once per model and served from the cache afterwards.
    pub fn resolve_relations(&self, model: &str) -> ModelResult<Arc<[RelationDescriptor]>> {
        if let Some(cached) = self.relations.get(model) {
            return Ok(cached.value().clone());
        }

        let schema = self.schema(model)?;
        let mut resolved: Vec<RelationDescriptor> = Vec::new();

        for descriptor in schema.declared_relations() {
            if schema.has_attribute(&descriptor.name) {
                return Err(ModelError::Reflection(format!(
                    "relation '{}' on '{}' shadows an attribute",
                    descriptor.name, model
                )));
            }
            if resolved.iter().any(|r| r.name == descriptor.name) {
                return Err(ModelError::Reflection(format!(
                    "relation '{}' declared twice on '{}'",
                    descriptor.name, model
                )));
            }
            if descriptor.link.is_empty() {
                return Err(ModelError::Reflection(format!(
                    "relation '{}' on '{}' has an empty link mapping",
                    descriptor.name, model
                )));
            }

            let target = self.schema(&descriptor.target).map_err(|_| {
                ModelError::Reflection(format!(
                    "relation '{}' on '{}' targets unregistered model '{}'",
                    descriptor.name, model, descriptor.target
                ))
            })?;

            for (related, local) in descriptor.link.pairs() {
                if !target.has_attribute(related) {
                    return Err(ModelError::Reflection(format!(
                        "link column '{}' is not an attribute of '{}'",
                        related,
                        target.name()
                    )));
                }
                if !schema.has_attribute(local) {
                    return Err(ModelError::Reflection(format!(
                        "link column '{}' is not an attribute of '{}'",
                        local, model
                    )));
                }
            }

            resolved.push(descriptor.clone());
        }

        let resolved: Arc<[RelationDescriptor]> = resolved.into();
        self.relations.insert(model.to_string(), resolved.clone());
        debug!("Resolved {} relation(s) for '{}'", resolved.len(), model);
        Ok(resolved)
    }

    /// Resolve a single relation by name
    pub fn relation(&self, model: &str, name: &str) -> ModelResult<RelationDescriptor> {
        self.resolve_relations(model)?
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownRelation(format!("{}.{}", model, name)))
    }

    /// Check if a relation exists
    pub fn has_relation(&self, model: &str, name: &str) -> bool {
        self.schemas
            .get(model)
            .map(|schema| schema.declared_relations().iter().any(|r| r.name == name))
            .unwrap_or(false)
    }
}
