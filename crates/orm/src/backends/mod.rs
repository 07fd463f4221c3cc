//! Database Backend Abstractions
//!
//! The row-level storage seam used by records and cascading saves, with an
//! in-memory implementation and a PostgreSQL one.

pub mod core;
pub mod memory;
pub mod postgres;

// Re-export core traits and types
pub use core::*;
pub use memory::{MemoryDatabase, MemoryStats, MemoryTransaction, Operation};
pub use postgres::{PostgresConnection, PostgresTransaction};
