//! Database layer
//!
//! SQLite through sqlx. The schema is created by embedded migrations and
//! every aggregate is reached through a repository trait.
//!
//! ```ignore
//! use quillhub::config::DatabaseConfig;
//! use quillhub::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping};
