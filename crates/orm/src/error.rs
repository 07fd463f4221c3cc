//! Error types for the ORM system
//!
//! Validation failures are not errors: a failed validation makes `save`
//! return `Ok(false)` and leaves the messages on the record. Everything in
//! this module is raised, always after the surrounding transaction has been
//! rolled back.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Storage failure during save, delete or query
    #[error("Database error: {0}")]
    Database(String),

    /// Connection pool or connection setup error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction begin/commit/rollback failure
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Foreign key direction is ambiguous or impossible
    #[error("Unable to link models: {0}")]
    Link(String),

    /// Relation metadata cannot be resolved for a model
    #[error("Relation metadata error: {0}")]
    Reflection(String),

    /// Primary key is missing or blank
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    /// Attribute is not declared on the model
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// Relation is not declared on the model
    #[error("Unknown relation '{0}'")]
    UnknownRelation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// True for storage-level failures (as opposed to programming errors)
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            ModelError::Database(_) | ModelError::Connection(_) | ModelError::Transaction(_)
        )
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ModelError::Link("both sides hold the key".to_string()).to_string(),
            "Unable to link models: both sides hold the key"
        );
        assert_eq!(
            ModelError::UnknownAttribute("nickname".to_string()).to_string(),
            "Unknown attribute 'nickname'"
        );
        assert_eq!(
            ModelError::MissingPrimaryKey.to_string(),
            "Primary key is missing or invalid"
        );
    }

    #[test]
    fn test_persistence_classification() {
        assert!(ModelError::Database("disk full".to_string()).is_persistence());
        assert!(ModelError::Transaction("commit failed".to_string()).is_persistence());
        assert!(!ModelError::Link("ambiguous".to_string()).is_persistence());
        assert!(!ModelError::Reflection("unknown model".to_string()).is_persistence());
    }
}
