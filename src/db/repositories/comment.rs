//! Comment repository

use crate::models::Comment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

use super::user::row_to_summary;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.content, c.created_at,
           u.id AS author_id, u.username AS author_username, u.email AS author_email,
           pr.avatar AS author_avatar,
           (SELECT COUNT(*) FROM comment_likes cl WHERE cl.comment_id = c.id) AS likes_count
    FROM comments c
    JOIN users u ON u.id = c.author_id
    LEFT JOIN profiles pr ON pr.user_id = u.id
"#;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Comments of a post, oldest first
    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Comment>>;

    /// Latest comments written by a user
    async fn recent_by_author(&self, author_id: i64, limit: i64) -> Result<Vec<Comment>>;

    /// Comments left on any post written by `author_id`
    async fn count_on_author_posts(&self, author_id: i64) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxCommentRepository {
    pool: SqlitePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO comments (post_id, author_id, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create comment")?;
        Ok(result.last_insert_rowid())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE c.id = ?", COMMENT_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get comment")?;
        Ok(row.as_ref().map(row_to_comment))
    }

    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "{} WHERE c.post_id = ? ORDER BY c.created_at ASC, c.id ASC",
            COMMENT_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list comments")?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn recent_by_author(&self, author_id: i64, limit: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "{} WHERE c.author_id = ? ORDER BY c.created_at DESC, c.id DESC LIMIT ?",
            COMMENT_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(author_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list recent comments")?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn count_on_author_posts(&self, author_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM comments c JOIN posts p ON p.id = c.post_id
            WHERE p.author_id = ?
            "#,
        )
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count comments")?;
        Ok(row.get("count"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete comment")?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_comment(row: &SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author: row_to_summary(row, "author_"),
        content: row.get("content"),
        likes_count: row.get("likes_count"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_post, insert_user, setup_pool};
    use crate::models::Privacy;
    use chrono::Duration;

    #[tokio::test]
    async fn test_comments_oldest_first() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let post = insert_post(&pool, alice, "Hello", Privacy::Public).await;
        let repo = SqlxCommentRepository::new(pool);

        let now = Utc::now();
        let second = repo.create(post, bob, "second", now).await.unwrap();
        let first = repo
            .create(post, alice, "first", now - Duration::minutes(5))
            .await
            .unwrap();

        let comments = repo.list_by_post(post).await.unwrap();
        let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(comments[1].author.username, "bob");
        assert_eq!(comments[1].likes_count, 0);
    }

    #[tokio::test]
    async fn test_author_statistics() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let post = insert_post(&pool, alice, "Hello", Privacy::Public).await;
        let other = insert_post(&pool, bob, "Other", Privacy::Public).await;
        let repo = SqlxCommentRepository::new(pool);

        let now = Utc::now();
        for i in 0..3 {
            repo.create(post, bob, &format!("c{}", i), now + Duration::seconds(i))
                .await
                .unwrap();
        }
        repo.create(other, bob, "elsewhere", now).await.unwrap();

        assert_eq!(repo.count_on_author_posts(alice).await.unwrap(), 3);
        let recent = repo.recent_by_author(bob, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "c2");
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let post = insert_post(&pool, alice, "Hello", Privacy::Public).await;
        let repo = SqlxCommentRepository::new(pool);

        let id = repo.create(post, alice, "bye", Utc::now()).await.unwrap();
        assert!(repo.get_by_id(id).await.unwrap().is_some());
        assert!(repo.delete(id).await.unwrap());
        assert!(repo.get_by_id(id).await.unwrap().is_none());
    }
}
