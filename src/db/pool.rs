//! SQLite connection pool
//!
//! The configured URL may be a bare file path, a `sqlite:` URL or
//! `:memory:`. File databases get their parent directory created and are
//! opened in create mode; every connection enforces foreign keys.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::DatabaseConfig;

const MAX_CONNECTIONS: u32 = 20;

/// Build connect options for a configured database URL
fn connect_options(url: &str) -> Result<SqliteConnectOptions> {
    if url == ":memory:" || url.starts_with("sqlite::memory:") {
        return SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory SQLite URL")
            .map(|opts| opts.foreign_keys(true));
    }

    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"));
    let path = path.unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }
    }

    Ok(SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true))
}

/// Create the application's connection pool
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = connect_options(&config.url)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", config.url))?;

    tracing::debug!("Connected to SQLite database at {}", config.url);
    Ok(pool)
}

/// Create a private in-memory database for tests
///
/// A single long-lived connection keeps the database alive for the life of
/// the pool and isolates it from every other test.
pub async fn create_test_pool() -> Result<SqlitePool> {
    let options = connect_options(":memory:")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("Failed to create in-memory SQLite database")
}

/// Check that the database answers queries
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_memory_pool_ping() {
        let config = DatabaseConfig {
            url: ":memory:".to_string(),
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        ping(&pool).await.expect("Ping should succeed");
    }

    #[tokio::test]
    async fn test_test_pools_are_isolated() {
        let a = create_test_pool().await.unwrap();
        let b = create_test_pool().await.unwrap();

        sqlx::query("CREATE TABLE marker (id INTEGER PRIMARY KEY)")
            .execute(&a)
            .await
            .unwrap();

        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = 'marker'",
        )
        .fetch_one(&b)
        .await
        .unwrap();
        let n: i64 = row.get("n");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();
        let row = sqlx::query("PRAGMA foreign_keys").fetch_one(&pool).await.unwrap();
        let enabled: i64 = row.get(0);
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_file_pool_creates_nested_directories() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("nested").join("dir").join("test.db");

        let config = DatabaseConfig {
            url: db_path.to_string_lossy().to_string(),
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        ping(&pool).await.expect("Ping should succeed");

        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_sqlite_url_prefix_accepted() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("prefixed.db");

        let config = DatabaseConfig {
            url: format!("sqlite:{}?mode=rwc", db_path.display()),
        };
        let pool = create_pool(&config).await.unwrap();
        ping(&pool).await.unwrap();
        assert!(db_path.exists());
    }
}
