//! Cascading saves across relations

pub mod orchestrator;
pub mod selector;

pub use orchestrator::{CascadeSave, SavePhase};
pub use selector::{Partition, SaveSelector, Selection};
