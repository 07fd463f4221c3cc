//! Value Assigner - merges caller input into relation values without
//! touching storage.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::metadata::Cardinality;
use crate::error::ModelResult;
use crate::model::{Attributes, Record, RelationValue};

/// Capability of a bound form-like object to write itself into a record
pub trait AssignTo: Send + Sync {
    fn assign_to(&self, record: &mut Record) -> ModelResult<()>;
}

/// Input for one related record
#[derive(Clone)]
pub enum AssignmentSource {
    /// Plain attribute mapping
    Fields(Attributes),
    /// Bound form exposing [`AssignTo`]
    Form(Arc<dyn AssignTo>),
    /// Input carrying nothing to merge (null or a scalar)
    Empty,
}

impl AssignmentSource {
    pub fn form<F: AssignTo + 'static>(form: F) -> Self {
        AssignmentSource::Form(Arc::new(form))
    }

    /// Apply this input to a record
    pub fn apply(&self, record: &mut Record) -> ModelResult<()> {
        match self {
            AssignmentSource::Fields(fields) => {
                record.set_attributes(fields, false);
                Ok(())
            }
            AssignmentSource::Form(form) => form.assign_to(record),
            AssignmentSource::Empty => Ok(()),
        }
    }
}

impl fmt::Debug for AssignmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentSource::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            AssignmentSource::Form(_) => f.write_str("Form(..)"),
            AssignmentSource::Empty => f.write_str("Empty"),
        }
    }
}

impl From<Value> for AssignmentSource {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => AssignmentSource::Fields(fields.into_iter().collect()),
            _ => AssignmentSource::Empty,
        }
    }
}

/// Value assigned to a relation
#[derive(Debug, Clone)]
pub enum RelationAssignment {
    /// One input (mapping, form, or nothing)
    Single(AssignmentSource),
    /// Ordered sequence of inputs
    List(Vec<AssignmentSource>),
}

impl From<Value> for RelationAssignment {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                RelationAssignment::List(items.into_iter().map(AssignmentSource::from).collect())
            }
            other => RelationAssignment::Single(other.into()),
        }
    }
}

impl From<AssignmentSource> for RelationAssignment {
    fn from(source: AssignmentSource) -> Self {
        RelationAssignment::Single(source)
    }
}

impl From<Vec<AssignmentSource>> for RelationAssignment {
    fn from(sources: Vec<AssignmentSource>) -> Self {
        RelationAssignment::List(sources)
    }
}

impl Record {
    /// Assign caller input to a declared relation.
    ///
    /// `One`: the input is merged into the current related record, created
    /// blank first when there is none. `Many`: every element of a list
    /// becomes a fresh related record; one whose key columns are all filled
    /// is marked as already stored. A non-list input empties the collection.
    pub fn assign_relation(
        &mut self,
        name: &str,
        value: impl Into<RelationAssignment>,
    ) -> ModelResult<()> {
        let relation = self.registry().relation(self.model_name(), name)?;
        let value = value.into();

        match relation.cardinality {
            Cardinality::One => {
                let mut related = match self.take_relation(name) {
                    Some(RelationValue::One(Some(existing))) => *existing,
                    _ => self.registry().create(&relation.target)?,
                };
                if let RelationAssignment::Single(source) = &value {
                    source.apply(&mut related)?;
                }
                self.populate_relation(name, RelationValue::One(Some(Box::new(related))));
            }
            Cardinality::Many => {
                let sources = match value {
                    RelationAssignment::List(sources) => sources,
                    RelationAssignment::Single(_) => Vec::new(),
                };
                let mut records = Vec::with_capacity(sources.len());
                for source in &sources {
                    let mut related = self.registry().create(&relation.target)?;
                    source.apply(&mut related)?;
                    if related.has_primary_key() {
                        related.set_is_new_record(false);
                    }
                    records.push(related);
                }
                self.populate_relation(name, RelationValue::Many(records));
            }
        }
        Ok(())
    }

    /// Set a named value, dispatching relations to [`Record::assign_relation`]
    pub fn assign(&mut self, name: &str, value: Value) -> ModelResult<()> {
        if self.registry().has_relation(self.model_name(), name) {
            self.assign_relation(name, value)
        } else {
            self.set(name, value)
        }
    }
}
