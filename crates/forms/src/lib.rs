//! # cascade-forms
//!
//! Input forms that nest other forms. A form binds untyped request data
//! (its own attributes plus nested `one`/`many` forms), validates the whole
//! tree, and writes itself into a `cascade_orm::Record` through the
//! record's relation assignment, ready for a cascading save.

pub mod form;
pub mod schema;

pub use form::{Form, NestedValue};
pub use schema::{FormSchema, Nesting, NestedForm};
