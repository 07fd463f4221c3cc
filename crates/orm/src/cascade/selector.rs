//! Save selectors - which attributes and relations take part in a save

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::relationships::RelationDescriptor;

/// One entry of a [`SaveSelector`]
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Attribute name, or a relation saved unrestricted
    Name(String),
    /// Relation with its own restriction
    Nested(String, SaveSelector),
}

impl Selection {
    pub fn name(&self) -> &str {
        match self {
            Selection::Name(name) | Selection::Nested(name, _) => name,
        }
    }
}

/// Caller restriction of a cascading save.
///
/// Relations not named here are neither linked nor saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveSelector {
    entries: Vec<Selection>,
    /// Columns written whenever plain attributes are restricted
    linked: Vec<String>,
}

/// A selector split against the relations of one model
#[derive(Debug)]
pub struct Partition<'r> {
    /// Plain attribute names; `None` saves every attribute
    pub attributes: Option<Vec<String>>,
    /// Selected relations in declaration order with their sub-selectors
    pub relations: Vec<(&'r RelationDescriptor, Option<SaveSelector>)>,
}

impl SaveSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector made of plain names
    pub fn of(names: &[&str]) -> Self {
        names.iter().fold(Self::new(), |selector, name| selector.name(name))
    }

    /// Add an attribute or an unrestricted relation
    pub fn name(mut self, name: &str) -> Self {
        self.entries.push(Selection::Name(name.to_string()));
        self
    }

    /// Add a relation with its own restriction
    pub fn nested(mut self, relation: &str, selector: SaveSelector) -> Self {
        self.entries.push(Selection::Nested(relation.to_string(), selector));
        self
    }

    pub fn entries(&self) -> &[Selection] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `["name", {"items": ["sku"]}]`-shaped input
    pub fn from_value(value: &Value) -> ModelResult<Self> {
        let Value::Array(items) = value else {
            return Err(ModelError::Serialization(
                "save selector must be an array".to_string(),
            ));
        };

        let mut selector = Self::new();
        for item in items {
            match item {
                Value::String(name) => selector = selector.name(name),
                Value::Object(nested) => {
                    for (relation, sub) in nested {
                        selector = selector.nested(relation, Self::from_value(sub)?);
                    }
                }
                other => {
                    return Err(ModelError::Serialization(format!(
                        "unexpected save selector entry: {}",
                        other
                    )))
                }
            }
        }
        Ok(selector)
    }

    /// Copy of this selector that always writes `columns` when it restricts
    /// plain attributes
    pub(crate) fn with_linked_columns<'a, I>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut selector = self.clone();
        for column in columns {
            if !selector.linked.iter().any(|c| c == column) {
                selector.linked.push(column.to_string());
            }
        }
        selector
    }

    /// Split into plain attribute names and selected relations.
    ///
    /// Relations come back in the order of `relations`, not of the selector.
    /// A nested entry that names no relation is an error.
    pub fn partition<'r>(&self, relations: &'r [RelationDescriptor]) -> ModelResult<Partition<'r>> {
        let mut attributes = Vec::new();
        let mut picked: Vec<(&str, Option<SaveSelector>)> = Vec::new();

        for entry in &self.entries {
            let is_relation = relations.iter().any(|r| r.name == entry.name());
            match entry {
                Selection::Name(name) if is_relation => picked.push((name.as_str(), None)),
                Selection::Name(name) => attributes.push(name.clone()),
                Selection::Nested(name, _) if !is_relation => {
                    return Err(ModelError::UnknownRelation(name.clone()))
                }
                Selection::Nested(name, sub) => {
                    let sub = (!sub.is_empty()).then(|| sub.clone());
                    picked.push((name.as_str(), sub));
                }
            }
        }

        let attributes = if attributes.is_empty() {
            None
        } else {
            for column in &self.linked {
                if !attributes.contains(column) {
                    attributes.push(column.clone());
                }
            }
            Some(attributes)
        };

        let relations = relations
            .iter()
            .filter_map(|descriptor| {
                picked
                    .iter()
                    .rev()
                    .find(|(name, _)| *name == descriptor.name)
                    .map(|(_, sub)| (descriptor, sub.clone()))
            })
            .collect();

        Ok(Partition {
            attributes,
            relations,
        })
    }
}
