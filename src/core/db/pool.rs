//! Database connection pool management
//!
//! This module provides connection pool setup and management for SQLite
//! using SQLx. Any `sqlite:` URL works, including `sqlite::memory:`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::core::config::DEFAULT_DATABASE_URL;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL (e.g., sqlite://whiteboard.db?mode=rwc)
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to keep open
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout for connections in seconds
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl DbConfig {
    /// Create config for a specific URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    /// In-memory database, used by tests
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    /// Whether the URL points at a private in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

/// Create a new database connection pool
pub async fn create_pool(config: &DbConfig) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // Every connection to `:memory:` opens its own database, so the pool must
    // hold exactly one connection and never recycle it.
    let pool = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await?
    };

    Ok(pool)
}

/// Create pool and run migrations
pub async fn create_pool_with_migrations(config: &DbConfig) -> Result<SqlitePool, DbError> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Check database health
pub async fn health_check(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.idle_timeout_secs, 600);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_in_memory_detection() {
        assert!(DbConfig::in_memory().is_in_memory());
        assert!(DbConfig::new("sqlite://file:shared?mode=memory&cache=shared").is_in_memory());
        assert!(!DbConfig::new("sqlite://whiteboard.db").is_in_memory());
    }

    #[tokio::test]
    async fn test_in_memory_pool_runs_migrations() {
        let pool = create_pool_with_migrations(&DbConfig::in_memory())
            .await
            .unwrap();

        health_check(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'diagrams') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["diagrams", "users"]);
    }
}
