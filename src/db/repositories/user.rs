//! User repository
//!
//! Accounts are stored together with their profile row: creating a user
//! inserts both in one transaction.

use crate::models::{User, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, is_staff, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and its empty profile
    async fn create(&self, user: &User) -> Result<User>;

    /// Like [`UserRepository::create`], but the account is made staff when
    /// the users table is empty. The emptiness check is part of the INSERT.
    async fn create_promoting_first(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Case-insensitive email lookup
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Resolve usernames to public summaries, skipping unknown names
    async fn summaries_by_usernames(&self, usernames: &[String]) -> Result<Vec<UserSummary>>;

    async fn summary(&self, id: i64) -> Result<Option<UserSummary>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user")?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn insert(&self, user: &User, promote_first: bool) -> Result<User> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, is_staff, created_at, updated_at)
            VALUES (?, ?, ?, (? OR (? AND NOT EXISTS (SELECT 1 FROM users))), ?, ?)
            RETURNING id, is_staff
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_staff)
        .bind(promote_first)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to create user")?;

        let id: i64 = row.get("id");
        let is_staff: bool = row.get("is_staff");

        sqlx::query("INSERT INTO profiles (user_id, bio) VALUES (?, '')")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to create profile")?;

        tx.commit().await.context("Failed to commit user creation")?;

        Ok(User {
            id,
            is_staff,
            ..user.clone()
        })
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        self.insert(user, false).await
    }

    async fn create_promoting_first(&self, user: &User) -> Result<User> {
        self.insert(user, true).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one_where("username = ?", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_where("email = ? COLLATE NOCASE", email).await
    }

    async fn summaries_by_usernames(&self, usernames: &[String]) -> Result<Vec<UserSummary>> {
        let mut summaries = Vec::with_capacity(usernames.len());
        for username in usernames {
            let row = sqlx::query(
                r#"
                SELECT u.id, u.username, u.email, p.avatar
                FROM users u LEFT JOIN profiles p ON p.user_id = u.id
                WHERE u.username = ?
                "#,
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up tagged user")?;

            if let Some(row) = row {
                summaries.push(row_to_summary(&row, ""));
            }
        }
        Ok(summaries)
    }

    async fn summary(&self, id: i64) -> Result<Option<UserSummary>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email, p.avatar
            FROM users u LEFT JOIN profiles p ON p.user_id = u.id
            WHERE u.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user summary")?;

        Ok(row.map(|r| row_to_summary(&r, "")))
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_staff: row.get("is_staff"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Build a summary from `{prefix}id`, `{prefix}username`, `{prefix}email`
/// and `{prefix}avatar` columns
pub(crate) fn row_to_summary(row: &SqliteRow, prefix: &str) -> UserSummary {
    let id: i64 = row.get(format!("{}id", prefix).as_str());
    let username: String = row.get(format!("{}username", prefix).as_str());
    let email: String = row.get(format!("{}email", prefix).as_str());
    let avatar: Option<String> = row.get(format!("{}avatar", prefix).as_str());
    UserSummary::new(id, username, &email, avatar.as_deref())
}
