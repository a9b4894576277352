//! Notification repository

use crate::models::{NewNotification, Notification};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

use super::user::row_to_summary;

const NOTIFICATION_SELECT: &str = r#"
    SELECT n.id, n.recipient_id, n.notification_type, n.post_id, n.comment_id,
           n.is_read, n.created_at,
           u.id AS sender_id, u.username AS sender_username, u.email AS sender_email,
           pr.avatar AS sender_avatar,
           p.slug AS post_slug, p.title AS post_title
    FROM notifications n
    JOIN users u ON u.id = n.sender_id
    LEFT JOIN profiles pr ON pr.user_id = u.id
    LEFT JOIN posts p ON p.id = n.post_id
"#;

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &NewNotification) -> Result<i64>;

    /// Every notification of a user, newest first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>>;

    /// Newest unread notifications
    async fn unread(&self, user_id: i64, limit: i64) -> Result<Vec<Notification>>;

    async fn unread_count(&self, user_id: i64) -> Result<i64>;

    /// Mark every unread notification read, returning how many changed
    async fn mark_all_read(&self, user_id: i64) -> Result<i64>;
}

pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, notification: &NewNotification) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications
                (recipient_id, sender_id, notification_type, post_id, comment_id, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(notification.recipient_id)
        .bind(notification.sender_id)
        .bind(notification.notification_type.to_string())
        .bind(notification.post_id)
        .bind(notification.comment_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to create notification")?;
        Ok(result.last_insert_rowid())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        let sql = format!(
            "{} WHERE n.recipient_id = ? ORDER BY n.created_at DESC, n.id DESC",
            NOTIFICATION_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list notifications")?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn unread(&self, user_id: i64, limit: i64) -> Result<Vec<Notification>> {
        let sql = format!(
            "{} WHERE n.recipient_id = ? AND n.is_read = 0 \
             ORDER BY n.created_at DESC, n.id DESC LIMIT ?",
            NOTIFICATION_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list unread notifications")?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn unread_count(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count unread notifications")?;
        Ok(row.get("count"))
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<i64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark notifications read")?;
        Ok(result.rows_affected() as i64)
    }
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification> {
    let kind: String = row.get("notification_type");
    Ok(Notification {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        sender: row_to_summary(row, "sender_"),
        notification_type: kind.parse()?,
        post_id: row.get("post_id"),
        post_slug: row.get("post_slug"),
        post_title: row.get("post_title"),
        comment_id: row.get("comment_id"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_post, insert_user, setup_pool};
    use crate::models::{NotificationType, Privacy};

    #[tokio::test]
    async fn test_list_and_mark_read() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let post = insert_post(&pool, alice, "Hello", Privacy::Public).await;
        let repo = SqlxNotificationRepository::new(pool);

        repo.create(&NewNotification {
            recipient_id: alice,
            sender_id: bob,
            notification_type: NotificationType::Follow,
            post_id: None,
            comment_id: None,
        })
        .await
        .unwrap();
        let like = repo
            .create(&NewNotification {
                recipient_id: alice,
                sender_id: bob,
                notification_type: NotificationType::Like,
                post_id: Some(post),
                comment_id: None,
            })
            .await
            .unwrap();

        let all = repo.list_for_user(alice).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, like);
        assert_eq!(all[0].post_slug.as_deref(), Some("hello"));
        assert_eq!(all[0].sender.username, "bob");
        assert!(all[1].post_slug.is_none());

        assert_eq!(repo.unread_count(alice).await.unwrap(), 2);
        assert_eq!(repo.unread(alice, 1).await.unwrap().len(), 1);
        assert_eq!(repo.mark_all_read(alice).await.unwrap(), 2);
        assert_eq!(repo.unread_count(alice).await.unwrap(), 0);
        assert!(repo.list_for_user(alice).await.unwrap().iter().all(|n| n.is_read));
        assert!(repo.list_for_user(bob).await.unwrap().is_empty());
    }
}
