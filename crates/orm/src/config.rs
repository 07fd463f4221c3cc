//! Database configuration
//!
//! Connection URL, pool sizing and transaction options, built in code or
//! read from the environment.

use std::env;

use url::Url;

use crate::error::{ModelError, ModelResult};
use crate::transaction::TransactionConfig;

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            idle_timeout: Some(600), // 10 minutes
            max_lifetime: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// Everything needed to open a [`crate::backends::PostgresConnection`]
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    database_url: String,
    pool: PoolConfig,
    transaction: TransactionConfig,
}

impl DatabaseConfig {
    /// Create a configuration for a PostgreSQL URL
    pub fn new(database_url: impl Into<String>) -> ModelResult<Self> {
        let database_url = database_url.into();
        validate_database_url(&database_url)?;
        Ok(Self {
            database_url,
            pool: PoolConfig::default(),
            transaction: TransactionConfig::default(),
        })
    }

    /// Read `DATABASE_URL` and the optional `DATABASE_MAX_CONNECTIONS`,
    /// `DATABASE_MIN_CONNECTIONS` and `DATABASE_ACQUIRE_TIMEOUT`
    pub fn from_env() -> ModelResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> ModelResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .ok_or_else(|| ModelError::Configuration("DATABASE_URL is not set".to_string()))?;
        let mut config = Self::new(url)?;

        if let Some(max) = parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")? {
            config.pool.max_connections = max;
        }
        if let Some(min) = parse_var(&lookup, "DATABASE_MIN_CONNECTIONS")? {
            config.pool.min_connections = min;
        }
        if let Some(timeout) = parse_var(&lookup, "DATABASE_ACQUIRE_TIMEOUT")? {
            config.pool.acquire_timeout = timeout;
        }

        if config.pool.min_connections > config.pool.max_connections {
            return Err(ModelError::Configuration(format!(
                "min connections ({}) exceed max connections ({})",
                config.pool.min_connections, config.pool.max_connections
            )));
        }
        Ok(config)
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.pool.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout_seconds: u64) -> Self {
        self.pool.acquire_timeout = timeout_seconds;
        self
    }

    pub fn with_transaction(mut self, transaction: TransactionConfig) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    pub fn transaction(&self) -> &TransactionConfig {
        &self.transaction
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> ModelResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ModelError::Configuration(format!("{} has invalid value '{}'", key, raw))),
    }
}

/// Check that a URL points at a PostgreSQL database
pub fn validate_database_url(database_url: &str) -> ModelResult<()> {
    let parsed = Url::parse(database_url)
        .map_err(|e| ModelError::Configuration(format!("Invalid database URL: {}", e)))?;

    if !matches!(parsed.scheme(), "postgres" | "postgresql") {
        return Err(ModelError::Configuration(format!(
            "Unsupported database scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ModelError::Configuration(
            "Missing host in database URL".to_string(),
        ));
    }
    if parsed.path().trim_start_matches('/').is_empty() {
        return Err(ModelError::Configuration(
            "Missing database name in URL".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_validate_database_url() {
        assert!(validate_database_url("postgres://localhost/shop").is_ok());
        assert!(validate_database_url("postgresql://user:pw@db:5432/shop").is_ok());
        assert!(validate_database_url("mysql://localhost/shop").is_err());
        assert!(validate_database_url("postgres://localhost").is_err());
        assert!(validate_database_url("not a url").is_err());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config =
            DatabaseConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/shop")]))
                .unwrap();
        assert_eq!(config.database_url(), "postgres://localhost/shop");
        assert_eq!(config.pool(), &PoolConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("DATABASE_MAX_CONNECTIONS", "25"),
            ("DATABASE_MIN_CONNECTIONS", "5"),
            ("DATABASE_ACQUIRE_TIMEOUT", " 3 "),
        ]))
        .unwrap();
        assert_eq!(config.pool().max_connections, 25);
        assert_eq!(config.pool().min_connections, 5);
        assert_eq!(config.pool().acquire_timeout, 3);
    }

    #[test]
    fn test_from_lookup_errors() {
        assert!(matches!(
            DatabaseConfig::from_lookup(lookup(&[])),
            Err(ModelError::Configuration(_))
        ));
        assert!(DatabaseConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
        ]))
        .is_err());
        assert!(DatabaseConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("DATABASE_MAX_CONNECTIONS", "2"),
            ("DATABASE_MIN_CONNECTIONS", "4"),
        ]))
        .is_err());
    }
}
