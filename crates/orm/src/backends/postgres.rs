//! PostgreSQL Backend Implementation
//!
//! [`Connection`] and [`Transaction`] over a sqlx `PgPool`. Statements are
//! built dynamically from attribute maps with quoted identifiers and
//! positional parameters. Nulls are written as literal `NULL` so they take
//! the column's type, and text that spells an integer, a UUID or an RFC 3339
//! timestamp is bound as that type, since form input arrives as text.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

use super::core::{Connection, Transaction};
use crate::config::DatabaseConfig;
use crate::error::{ModelError, OrmResult};
use crate::model::Attributes;
use crate::transaction::TransactionConfig;

/// Pool-backed PostgreSQL connection
#[derive(Debug, Clone)]
pub struct PostgresConnection {
    pool: PgPool,
    transaction: TransactionConfig,
}

impl PostgresConnection {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: TransactionConfig::default(),
        }
    }

    /// Open a pool according to `config`
    pub async fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        let pool_config = config.pool();
        let mut options = PgPoolOptions::new()
            .max_connections(pool_config.max_connections)
            .min_connections(pool_config.min_connections)
            .acquire_timeout(Duration::from_secs(pool_config.acquire_timeout))
            .test_before_acquire(pool_config.test_before_acquire);

        if let Some(idle_timeout) = pool_config.idle_timeout {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }
        if let Some(max_lifetime) = pool_config.max_lifetime {
            options = options.max_lifetime(Duration::from_secs(max_lifetime));
        }

        let pool = options
            .connect(config.database_url())
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        debug!(
            "PostgreSQL pool ready (max {} connections)",
            pool_config.max_connections
        );
        Ok(Self::new(pool).with_transaction_config(config.transaction().clone()))
    }

    pub fn with_transaction_config(mut self, transaction: TransactionConfig) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn begin(&self) -> OrmResult<Box<dyn Transaction>> {
        debug!("Beginning transaction with config: {:?}", self.transaction);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to begin transaction: {}", e)))?;

        if let Some(isolation_level) = self.transaction.isolation_level {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation_level.as_sql());
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| ModelError::Transaction(format!("Failed to set isolation level: {}", e)))?;
        }
        if self.transaction.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| ModelError::Transaction(format!("Failed to set read-only mode: {}", e)))?;
        }

        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }
}

/// Open PostgreSQL transaction
pub struct PostgresTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn inner(&mut self) -> OrmResult<&mut sqlx::Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| ModelError::Transaction("Transaction already completed".to_string()))
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn insert(
        &mut self,
        table: &str,
        _primary_key: &[String],
        values: &Attributes,
    ) -> OrmResult<Attributes> {
        let statement = insert_statement(table, values);
        let tx = self.inner()?;
        let row = statement
            .query()
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| ModelError::Database(format!("Insert into '{}' failed: {}", table, e)))?;
        row_to_attributes(&row)
    }

    async fn update(&mut self, table: &str, key: &Attributes, values: &Attributes) -> OrmResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let statement = update_statement(table, key, values);
        let tx = self.inner()?;
        let result = statement
            .query()
            .execute(&mut **tx)
            .await
            .map_err(|e| ModelError::Database(format!("Update of '{}' failed: {}", table, e)))?;
        Ok(result.rows_affected())
    }

    async fn delete(&mut self, table: &str, key: &Attributes) -> OrmResult<u64> {
        let statement = delete_statement(table, key);
        let tx = self.inner()?;
        let result = statement
            .query()
            .execute(&mut **tx)
            .await
            .map_err(|e| ModelError::Database(format!("Delete from '{}' failed: {}", table, e)))?;
        Ok(result.rows_affected())
    }

    async fn select(&mut self, table: &str, filter: &Attributes) -> OrmResult<Vec<Attributes>> {
        let statement = select_statement(table, filter);
        let tx = self.inner()?;
        let rows = statement
            .query()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| ModelError::Database(format!("Select from '{}' failed: {}", table, e)))?;
        rows.iter().map(row_to_attributes).collect()
    }

    async fn commit(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| ModelError::Transaction("Transaction already completed".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| ModelError::Transaction("Transaction already completed".to_string()))?;
        tx.rollback()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to rollback transaction: {}", e)))
    }
}

/// Typed statement parameter
#[derive(Debug, Clone, PartialEq)]
enum Param {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl Param {
    /// `None` for null, which is never bound
    fn from_value(value: &Value) -> Option<Self> {
        let param = match value {
            Value::Null => return None,
            Value::Bool(b) => Param::Bool(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Param::Integer(i),
                (None, Some(f)) => Param::Float(f),
                (None, None) => Param::Text(n.to_string()),
            },
            Value::String(s) => Param::from_text(s),
            Value::Array(_) | Value::Object(_) => Param::Json(value.clone()),
        };
        Some(param)
    }

    fn from_text(text: &str) -> Self {
        // Only the canonical spelling, so "007" stays text
        if let Ok(i) = text.parse::<i64>() {
            if i.to_string() == text {
                return Param::Integer(i);
            }
        }
        if let Ok(uuid) = Uuid::parse_str(text) {
            return Param::Uuid(uuid);
        }
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
            return Param::Timestamp(timestamp.with_timezone(&Utc));
        }
        Param::Text(text.to_string())
    }

    fn bind<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            Param::Bool(b) => query.bind(*b),
            Param::Integer(i) => query.bind(*i),
            Param::Float(f) => query.bind(*f),
            Param::Text(s) => query.bind(s.clone()),
            Param::Uuid(uuid) => query.bind(*uuid),
            Param::Timestamp(timestamp) => query.bind(*timestamp),
            Param::Json(value) => query.bind(sqlx::types::Json(value.clone())),
        }
    }
}

/// SQL text with its parameters in bind order
#[derive(Debug, PartialEq)]
struct Statement {
    sql: String,
    params: Vec<Param>,
}

impl Statement {
    fn query(&self) -> Query<'_, Postgres, PgArguments> {
        self.params
            .iter()
            .fold(sqlx::query(&self.sql), |query, param| param.bind(query))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Placeholder for `value`, or `NULL`
fn placeholder(params: &mut Vec<Param>, value: &Value) -> String {
    match Param::from_value(value) {
        Some(param) => {
            params.push(param);
            format!("${}", params.len())
        }
        None => "NULL".to_string(),
    }
}

/// Append `WHERE` conditions for every filter column; nulls use `IS NULL`
fn push_conditions(sql: &mut String, params: &mut Vec<Param>, filter: &Attributes) {
    if filter.is_empty() {
        return;
    }
    let conditions: Vec<String> = filter
        .iter()
        .map(|(column, value)| {
            if value.is_null() {
                format!("{} IS NULL", quote_identifier(column))
            } else {
                format!("{} = {}", quote_identifier(column), placeholder(params, value))
            }
        })
        .collect();
    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
}

fn insert_statement(table: &str, values: &Attributes) -> Statement {
    if values.is_empty() {
        return Statement {
            sql: format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote_identifier(table)),
            params: Vec::new(),
        };
    }
    let mut params = Vec::with_capacity(values.len());
    let columns: Vec<String> = values.keys().map(|c| quote_identifier(c)).collect();
    let placeholders: Vec<String> = values
        .values()
        .map(|value| placeholder(&mut params, value))
        .collect();
    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quote_identifier(table),
            columns.join(", "),
            placeholders.join(", ")
        ),
        params,
    }
}

fn update_statement(table: &str, key: &Attributes, values: &Attributes) -> Statement {
    let mut params = Vec::with_capacity(values.len() + key.len());
    let assignments: Vec<String> = values
        .iter()
        .map(|(column, value)| format!("{} = {}", quote_identifier(column), placeholder(&mut params, value)))
        .collect();
    let mut sql = format!(
        "UPDATE {} SET {}",
        quote_identifier(table),
        assignments.join(", ")
    );
    push_conditions(&mut sql, &mut params, key);
    Statement { sql, params }
}

fn delete_statement(table: &str, key: &Attributes) -> Statement {
    let mut params = Vec::new();
    let mut sql = format!("DELETE FROM {}", quote_identifier(table));
    push_conditions(&mut sql, &mut params, key);
    Statement { sql, params }
}

fn select_statement(table: &str, filter: &Attributes) -> Statement {
    let mut params = Vec::new();
    let mut sql = format!("SELECT * FROM {}", quote_identifier(table));
    push_conditions(&mut sql, &mut params, filter);
    Statement { sql, params }
}

fn row_to_attributes(row: &PgRow) -> OrmResult<Attributes> {
    let mut attributes = Attributes::new();
    for (index, column) in row.columns().iter().enumerate() {
        attributes.insert(column.name().to_string(), column_value(row, index)?);
    }
    Ok(attributes)
}

/// Decode one column into a JSON value by its PostgreSQL type name
fn column_value(row: &PgRow, index: usize) -> OrmResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => Value::from(row.try_get::<bool, _>(index)?),
        "INT2" => Value::from(row.try_get::<i16, _>(index)?),
        "INT4" => Value::from(row.try_get::<i32, _>(index)?),
        "INT8" => Value::from(row.try_get::<i64, _>(index)?),
        "FLOAT4" => Value::from(row.try_get::<f32, _>(index)?),
        "FLOAT8" => Value::from(row.try_get::<f64, _>(index)?),
        "UUID" => Value::from(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
        "TIMESTAMPTZ" => {
            Value::from(row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?.to_rfc3339())
        }
        "TIMESTAMP" => Value::from(row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string()),
        "DATE" => Value::from(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::from(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
        _ => row.try_get::<String, _>(index).map(Value::from).map_err(|e| {
            ModelError::Serialization(format!(
                "Failed to decode column of type '{}': {}",
                type_name, e
            ))
        })?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_insert_statement() {
        let statement = insert_statement("order items", &attrs(json!({"sku": "A-1", "order_id": 3})));
        assert_eq!(
            statement.sql,
            "INSERT INTO \"order items\" (\"order_id\", \"sku\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(
            statement.params,
            vec![Param::Integer(3), Param::Text("A-1".to_string())]
        );
    }

    #[test]
    fn test_insert_without_values() {
        let statement = insert_statement("orders", &Attributes::new());
        assert_eq!(statement.sql, "INSERT INTO \"orders\" DEFAULT VALUES RETURNING *");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_insert_writes_null_literal() {
        let statement = insert_statement("orders", &attrs(json!({"customer_id": null, "total": 4})));
        assert_eq!(
            statement.sql,
            "INSERT INTO \"orders\" (\"customer_id\", \"total\") VALUES (NULL, $1) RETURNING *"
        );
        assert_eq!(statement.params, vec![Param::Integer(4)]);
    }

    #[test]
    fn test_update_statement_clears_key_with_null_literal() {
        let statement = update_statement(
            "orders",
            &attrs(json!({"id": 7})),
            &attrs(json!({"customer_id": null, "total": 12.5})),
        );
        assert_eq!(
            statement.sql,
            "UPDATE \"orders\" SET \"customer_id\" = NULL, \"total\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(statement.params, vec![Param::Float(12.5), Param::Integer(7)]);
    }

    #[test]
    fn test_text_keys_bind_as_their_type() {
        let statement = update_statement(
            "items",
            &attrs(json!({"id": "2"})),
            &attrs(json!({"order_id": "14", "sku": "007"})),
        );
        assert_eq!(
            statement.sql,
            "UPDATE \"items\" SET \"order_id\" = $1, \"sku\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(
            statement.params,
            vec![
                Param::Integer(14),
                Param::Text("007".to_string()),
                Param::Integer(2)
            ]
        );

        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let select = select_statement("tags", &attrs(json!({"item_id": id})));
        assert_eq!(select.params, vec![Param::Uuid(Uuid::parse_str(id).unwrap())]);
    }

    #[test]
    fn test_timestamp_text_binds_as_timestamp() {
        let param = Param::from_text("2024-03-01T10:00:00+00:00");
        assert!(matches!(param, Param::Timestamp(_)));
        assert_eq!(Param::from_text("next week"), Param::Text("next week".to_string()));
        assert_eq!(Param::from_value(&Value::Null), None);
    }

    #[test]
    fn test_delete_statement_composite_key() {
        let statement = delete_statement("order_tags", &attrs(json!({"order_id": 1, "tag_id": 2})));
        assert_eq!(
            statement.sql,
            "DELETE FROM \"order_tags\" WHERE \"order_id\" = $1 AND \"tag_id\" = $2"
        );
        assert_eq!(statement.params.len(), 2);
    }

    #[test]
    fn test_select_statement_with_null_filter() {
        let statement = select_statement("items", &attrs(json!({"deleted_at": null, "order_id": 4})));
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"items\" WHERE \"deleted_at\" IS NULL AND \"order_id\" = $1"
        );
        assert_eq!(statement.params, vec![Param::Integer(4)]);

        let all = select_statement("items", &Attributes::new());
        assert_eq!(all.sql, "SELECT * FROM \"items\"");
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
