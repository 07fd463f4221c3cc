//! In-memory backend
//!
//! Tables live behind a shared mutex. Each transaction works on a private
//! copy of the tables which replaces the shared state on commit and is
//! dropped on rollback, so nothing a rolled-back transaction wrote is ever
//! visible. Intended for a single writer at a time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::debug;

use super::core::{Connection, Transaction};
use crate::error::{ModelError, OrmResult};
use crate::model::primary_key::{is_blank, values_match, PrimaryKey};
use crate::model::Attributes;

/// Storage operation, used to inject faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Select,
}

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Attributes>,
    next_id: i64,
}

impl Table {
    fn observe_id(&mut self, value: &Value) {
        if let Some(id) = value.as_i64() {
            self.next_id = self.next_id.max(id);
        }
    }
}

/// Transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

#[derive(Debug, Default)]
struct Shared {
    tables: BTreeMap<String, Table>,
    faults: HashSet<(Operation, String)>,
    stats: MemoryStats,
}

/// In-memory database implementing [`Connection`]
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock()
    }

    /// Store a row directly, outside any transaction
    pub fn insert_row(&self, table: &str, row: Attributes) {
        let mut shared = self.lock();
        let table = shared.tables.entry(table.to_string()).or_default();
        if let Some(id) = row.get("id") {
            table.observe_id(id);
        }
        table.rows.push(row);
    }

    /// Committed rows of a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Attributes> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// First committed row whose `column` equals `value`
    pub fn find(&self, table: &str, column: &str, value: &Value) -> Option<Attributes> {
        self.rows(table)
            .into_iter()
            .find(|row| row.get(column).map_or(false, |v| values_match(v, value)))
    }

    /// Make every `operation` on `table` fail with a database error
    pub fn fail_on(&self, operation: Operation, table: &str) {
        self.lock().faults.insert((operation, table.to_string()));
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }
}

#[async_trait]
impl Connection for MemoryDatabase {
    async fn begin(&self) -> OrmResult<Box<dyn Transaction>> {
        let mut shared = self.lock();
        shared.stats.begun += 1;
        debug!("Beginning in-memory transaction");
        Ok(Box::new(MemoryTransaction {
            shared: self.shared.clone(),
            tables: shared.tables.clone(),
            faults: shared.faults.clone(),
        }))
    }
}

/// Transaction over a private copy of the tables
pub struct MemoryTransaction {
    shared: Arc<Mutex<Shared>>,
    tables: BTreeMap<String, Table>,
    faults: HashSet<(Operation, String)>,
}

impl MemoryTransaction {
    fn check_fault(&self, operation: Operation, table: &str) -> OrmResult<()> {
        if self.faults.contains(&(operation, table.to_string())) {
            return Err(ModelError::Database(format!(
                "{:?} on '{}' failed",
                operation, table
            )));
        }
        Ok(())
    }

}

fn matches(row: &Attributes, filter: &Attributes) -> bool {
    filter.iter().all(|(column, expected)| match row.get(column) {
        Some(actual) => values_match(actual, expected),
        None => expected.is_null(),
    })
}

fn key_of(row: &Attributes, primary_key: &[String]) -> PrimaryKey {
    let values: Vec<Value> = primary_key
        .iter()
        .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
        .collect();
    PrimaryKey::from_values(&values)
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert(
        &mut self,
        table: &str,
        primary_key: &[String],
        values: &Attributes,
    ) -> OrmResult<Attributes> {
        self.check_fault(Operation::Insert, table)?;
        let storage = self.tables.entry(table.to_string()).or_default();
        let mut row = values.clone();

        if let [column] = primary_key {
            match row.get(column) {
                Some(value) if !is_blank(value) => storage.observe_id(value),
                _ => {
                    storage.next_id += 1;
                    row.insert(column.clone(), Value::from(storage.next_id));
                }
            }
        }

        let key = key_of(&row, primary_key);
        if storage.rows.iter().any(|existing| key_of(existing, primary_key) == key) {
            return Err(ModelError::Database(format!(
                "duplicate key ({}) in '{}'",
                key, table
            )));
        }

        storage.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&mut self, table: &str, key: &Attributes, values: &Attributes) -> OrmResult<u64> {
        self.check_fault(Operation::Update, table)?;
        let mut affected = 0;
        if let Some(storage) = self.tables.get_mut(table) {
            for row in storage.rows.iter_mut().filter(|row| matches(row, key)) {
                row.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&mut self, table: &str, key: &Attributes) -> OrmResult<u64> {
        self.check_fault(Operation::Delete, table)?;
        let Some(storage) = self.tables.get_mut(table) else {
            return Ok(0);
        };
        let before = storage.rows.len();
        storage.rows.retain(|row| !matches(row, key));
        Ok((before - storage.rows.len()) as u64)
    }

    async fn select(&mut self, table: &str, filter: &Attributes) -> OrmResult<Vec<Attributes>> {
        self.check_fault(Operation::Select, table)?;
        Ok(self
            .tables
            .get(table)
            .map(|storage| {
                storage
                    .rows
                    .iter()
                    .filter(|row| matches(row, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(self: Box<Self>) -> OrmResult<()> {
        let tables = self.tables.clone();
        let mut shared = self.shared.lock();
        shared.tables = tables;
        shared.stats.committed += 1;
        debug!("In-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> OrmResult<()> {
        let mut shared = self.shared.lock();
        shared.stats.rolled_back += 1;
        debug!("In-memory transaction rolled back");
        Ok(())
    }
}
