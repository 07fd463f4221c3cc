//! Transaction Management
//!
//! Transaction options for the Postgres backend and the commit-or-rollback
//! step that closes the outermost cascading save.

use tracing::{debug, warn};

use crate::backends::Transaction;
use crate::error::OrmResult;

/// Transaction isolation levels supported by PostgreSQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    /// Default PostgreSQL isolation level
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION ISOLATION LEVEL command
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction configuration options
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// `None` keeps the server default
    pub isolation_level: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TransactionConfig {
    pub fn serializable() -> Self {
        Self {
            isolation_level: Some(IsolationLevel::Serializable),
            ..Default::default()
        }
    }
}

/// Close a transaction according to the outcome of the work done in it.
///
/// `Ok(true)` commits. `Ok(false)` rolls back and reports `false`. An error
/// rolls back and is returned unchanged, even when the rollback itself fails.
pub async fn finish(tx: Box<dyn Transaction>, outcome: OrmResult<bool>) -> OrmResult<bool> {
    match outcome {
        Ok(true) => {
            tx.commit().await?;
            debug!("Transaction committed");
            Ok(true)
        }
        Ok(false) => {
            tx.rollback().await?;
            debug!("Transaction rolled back after unsuccessful save");
            Ok(false)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                warn!(
                    "Rollback after error '{}' failed: {}",
                    error, rollback_error
                );
            } else {
                debug!("Transaction rolled back after error: {}", error);
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Connection, MemoryDatabase};
    use crate::error::ModelError;
    use crate::model::Attributes;
    use async_trait::async_trait;

    struct BrokenRollback;

    #[async_trait]
    impl Transaction for BrokenRollback {
        async fn insert(&mut self, _: &str, _: &[String], values: &Attributes) -> OrmResult<Attributes> {
            Ok(values.clone())
        }

        async fn update(&mut self, _: &str, _: &Attributes, _: &Attributes) -> OrmResult<u64> {
            Ok(0)
        }

        async fn delete(&mut self, _: &str, _: &Attributes) -> OrmResult<u64> {
            Ok(0)
        }

        async fn select(&mut self, _: &str, _: &Attributes) -> OrmResult<Vec<Attributes>> {
            Ok(Vec::new())
        }

        async fn commit(self: Box<Self>) -> OrmResult<()> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> OrmResult<()> {
            Err(ModelError::Transaction("connection lost".to_string()))
        }
    }

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::ReadUncommitted.as_sql(), "READ UNCOMMITTED");
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }

    #[test]
    fn test_transaction_config_default() {
        let config = TransactionConfig::default();
        assert!(config.isolation_level.is_none());
        assert!(!config.read_only);
        assert_eq!(
            TransactionConfig::serializable().isolation_level,
            Some(IsolationLevel::Serializable)
        );
    }

    #[tokio::test]
    async fn test_finish_commits_on_success() {
        let db = MemoryDatabase::new();
        let tx = db.begin().await.unwrap();
        assert!(finish(tx, Ok(true)).await.unwrap());
        assert_eq!(db.stats().committed, 1);
    }

    #[tokio::test]
    async fn test_finish_rolls_back_on_failure() {
        let db = MemoryDatabase::new();
        let tx = db.begin().await.unwrap();
        assert!(!finish(tx, Ok(false)).await.unwrap());

        let tx = db.begin().await.unwrap();
        let err = finish(tx, Err(ModelError::Link("x".to_string()))).await.unwrap_err();
        assert_eq!(err, ModelError::Link("x".to_string()));
        assert_eq!(db.stats().rolled_back, 2);
        assert_eq!(db.stats().committed, 0);
    }

    #[tokio::test]
    async fn test_finish_keeps_original_error_when_rollback_fails() {
        let err = finish(Box::new(BrokenRollback), Err(ModelError::Database("boom".to_string())))
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::Database("boom".to_string()));
    }
}
