//! Relationships Module - relation metadata, registry and the linking,
//! assignment and reconciliation steps of a cascading save

pub mod metadata;
pub mod registry;

pub mod assign;
pub mod linker;
pub mod reconcile;

// Re-export metadata system types
pub use metadata::*;
pub use registry::*;

pub use assign::{AssignTo, AssignmentSource, RelationAssignment};
pub use linker::{link, unlink, LinkDirection};
pub use reconcile::reconcile;
