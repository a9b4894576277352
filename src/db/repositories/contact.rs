//! Contact messages and newsletter subscribers

use crate::models::{ContactMessage, NewsletterSubscriber};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn create_message(&self, name: &str, email: &str, message: &str)
        -> Result<ContactMessage>;

    /// All messages, newest first
    async fn list_messages(&self) -> Result<Vec<ContactMessage>>;

    async fn mark_responded(&self, id: i64) -> Result<bool>;

    /// Returns false when the address was already subscribed
    async fn subscribe(&self, email: &str) -> Result<bool>;

    async fn subscribers(&self) -> Result<Vec<NewsletterSubscriber>>;
}

pub struct SqlxContactRepository {
    pool: SqlitePool,
}

impl SqlxContactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn ContactRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContactRepository for SqlxContactRepository {
    async fn create_message(
        &self,
        name: &str,
        email: &str,
        message: &str,
    ) -> Result<ContactMessage> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO contact_messages (name, email, message, responded, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(message)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to store contact message")?;

        Ok(ContactMessage {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            message: message.to_string(),
            responded: false,
            created_at: now,
        })
    }

    async fn list_messages(&self) -> Result<Vec<ContactMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, message, responded, created_at
            FROM contact_messages
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list contact messages")?;

        Ok(rows
            .iter()
            .map(|row| ContactMessage {
                id: row.get("id"),
                name: row.get("name"),
                email: row.get("email"),
                message: row.get("message"),
                responded: row.get("responded"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn mark_responded(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE contact_messages SET responded = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update contact message")?;
        Ok(result.rows_affected() > 0)
    }

    async fn subscribe(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO newsletter_subscribers (email, subscribed_at) VALUES (?, ?)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to subscribe")?;
        Ok(result.rows_affected() > 0)
    }

    async fn subscribers(&self) -> Result<Vec<NewsletterSubscriber>> {
        let rows = sqlx::query(
            "SELECT id, email, subscribed_at FROM newsletter_subscribers ORDER BY subscribed_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list subscribers")?;

        Ok(rows
            .iter()
            .map(|row| NewsletterSubscriber {
                id: row.get("id"),
                email: row.get("email"),
                subscribed_at: row.get("subscribed_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;

    #[tokio::test]
    async fn test_messages() {
        let repo = SqlxContactRepository::new(setup_pool().await);

        let msg = repo
            .create_message("Ann", "ann@example.com", "Hello")
            .await
            .unwrap();
        assert!(!msg.responded);

        assert!(repo.mark_responded(msg.id).await.unwrap());
        assert!(!repo.mark_responded(999).await.unwrap());

        let all = repo.list_messages().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].responded);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let repo = SqlxContactRepository::new(setup_pool().await);

        assert!(repo.subscribe("ann@example.com").await.unwrap());
        assert!(!repo.subscribe("ann@example.com").await.unwrap());
        assert_eq!(repo.subscribers().await.unwrap().len(), 1);
    }
}
