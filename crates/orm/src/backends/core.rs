//! Core Database Backend Traits
//!
//! The row-level storage seam of the ORM. A [`Connection`] opens
//! transactions; every read and write of a cascading save runs through the
//! single [`Transaction`] opened for the outermost call.

use async_trait::async_trait;

use crate::error::OrmResult;
use crate::model::Attributes;

/// Source of transactions
#[async_trait]
pub trait Connection: Send + Sync {
    /// Begin a transaction
    async fn begin(&self) -> OrmResult<Box<dyn Transaction>>;
}

/// Abstract database transaction trait
#[async_trait]
pub trait Transaction: Send {
    /// Insert a row and return it as stored (including generated keys)
    async fn insert(
        &mut self,
        table: &str,
        primary_key: &[String],
        values: &Attributes,
    ) -> OrmResult<Attributes>;

    /// Update the rows matching `key`; returns affected row count
    async fn update(&mut self, table: &str, key: &Attributes, values: &Attributes) -> OrmResult<u64>;

    /// Delete the rows matching `key`; returns affected row count
    async fn delete(&mut self, table: &str, key: &Attributes) -> OrmResult<u64>;

    /// Select the rows whose columns equal every entry of `filter`
    async fn select(&mut self, table: &str, filter: &Attributes) -> OrmResult<Vec<Attributes>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> OrmResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> OrmResult<()>;
}
