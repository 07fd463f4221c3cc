//! Model System - schemas, records and validation
//!
//! - `schema`: per-model declaration of table, key, attributes and relations
//! - `record`: runtime instances with attribute state and relation values
//! - `primary_key`: key values and blank/equality helpers
//! - `validation`: attribute rules and collected messages

pub mod primary_key;
pub mod record;
pub mod schema;
pub mod validation;

pub use primary_key::{KeyValue, PrimaryKey};
pub use record::{Attributes, Record, RelationValue};
pub use schema::ModelSchema;
pub use validation::{Custom, MaxLength, Required, Rule, ValidationErrors, Validator};
