//! Relationship Metadata System - Statically declared relation descriptors

use serde::{Deserialize, Serialize};

/// Whether a relation holds one related record or an ordered collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Single related record or none
    One,
    /// Ordered collection of related records
    Many,
}

impl Cardinality {
    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Many)
    }
}

/// Column correspondence between two related models.
///
/// Each pair is `(related_column, local_column)`: the column on the related
/// model and the column on the declaring model that must hold equal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMapping {
    pairs: Vec<(String, String)>,
}

impl LinkMapping {
    pub fn new<I, R, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (R, L)>,
        R: Into<String>,
        L: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(related, local)| (related.into(), local.into()))
                .collect(),
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Columns on the related model, in declaration order
    pub fn related_columns(&self) -> Vec<&str> {
        self.pairs.iter().map(|(related, _)| related.as_str()).collect()
    }

    /// Columns on the declaring model, in declaration order
    pub fn local_columns(&self) -> Vec<&str> {
        self.pairs.iter().map(|(_, local)| local.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Immutable description of one declared relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Name of the relation on the declaring model
    pub name: String,

    /// Single record or collection
    pub cardinality: Cardinality,

    /// Registered model name of the related type
    pub target: String,

    /// Foreign key ↔ key column mapping
    pub link: LinkMapping,
}

impl RelationDescriptor {
    pub fn new(
        name: impl Into<String>,
        cardinality: Cardinality,
        target: impl Into<String>,
        link: LinkMapping,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality,
            target: target.into(),
            link,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.cardinality.is_collection()
    }
}
