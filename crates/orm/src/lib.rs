//! # cascade-orm: cascading relational persistence
//!
//! Records described by registered schemas, saved together with the
//! related records reachable through their declared relations inside one
//! transaction. Foreign keys are linked automatically and related
//! collections are reconciled against the rows already stored.
//!
//! ```no_run
//! use cascade_orm::{CascadeSave, MemoryDatabase, ModelRegistry, ModelSchema, SaveSelector};
//! use serde_json::json;
//!
//! # async fn demo() -> cascade_orm::OrmResult<()> {
//! let registry = ModelRegistry::new();
//! registry.register(
//!     ModelSchema::new("Order", "orders")
//!         .attributes(&["total"])
//!         .has_many("items", "Item", [("order_id", "id")]),
//! );
//! registry.register(ModelSchema::new("Item", "items").attributes(&["order_id", "sku"]));
//!
//! let db = MemoryDatabase::new();
//! let mut order = registry.create("Order")?;
//! order.set("total", 10)?;
//! order.assign_relation("items", json!([{"sku": "A-1"}, {"sku": "B-2"}]))?;
//! order
//!     .save_with_related(&db, true, Some(&SaveSelector::of(&["total", "items"])))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod cascade;
pub mod config;
pub mod error;
pub mod model;
pub mod relationships;
pub mod transaction;

// Re-export core traits and types
pub use backends::{Connection, MemoryDatabase, PostgresConnection, Transaction};
pub use cascade::{CascadeSave, SavePhase, SaveSelector};
pub use config::{DatabaseConfig, PoolConfig};
pub use error::*;
pub use model::*;
pub use relationships::{
    AssignTo, AssignmentSource, Cardinality, LinkDirection, LinkMapping, ModelRegistry,
    RelationAssignment, RelationDescriptor,
};
pub use transaction::{IsolationLevel, TransactionConfig};
