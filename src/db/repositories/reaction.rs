//! Likes, shares and comment likes
//!
//! Each reaction is unique per user and target. Toggling inserts the row
//! when it is absent and removes it otherwise.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Which post reaction table to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostReaction {
    Like,
    Share,
}

impl PostReaction {
    fn table(self) -> &'static str {
        match self {
            PostReaction::Like => "likes",
            PostReaction::Share => "shares",
        }
    }
}

#[async_trait]
pub trait ReactionRepository: Send + Sync {
    /// Toggle a post reaction; returns true when it now exists
    async fn toggle(&self, kind: PostReaction, user_id: i64, post_id: i64) -> Result<bool>;

    async fn exists(&self, kind: PostReaction, user_id: i64, post_id: i64) -> Result<bool>;

    async fn count(&self, kind: PostReaction, post_id: i64) -> Result<i64>;

    /// Likes received across every post of an author
    async fn total_likes_for_author(&self, author_id: i64) -> Result<i64>;

    /// Toggle a comment like; returns true when it now exists
    async fn toggle_comment_like(&self, user_id: i64, comment_id: i64) -> Result<bool>;

    async fn comment_likes(&self, comment_id: i64) -> Result<i64>;
}

pub struct SqlxReactionRepository {
    pool: SqlitePool,
}

impl SqlxReactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn ReactionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReactionRepository for SqlxReactionRepository {
    async fn toggle(&self, kind: PostReaction, user_id: i64, post_id: i64) -> Result<bool> {
        let delete = format!("DELETE FROM {} WHERE user_id = ? AND post_id = ?", kind.table());
        let removed = sqlx::query(&delete)
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove reaction")?
            .rows_affected();
        if removed > 0 {
            return Ok(false);
        }

        let insert = format!(
            "INSERT INTO {} (user_id, post_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT (user_id, post_id) DO NOTHING",
            kind.table()
        );
        sqlx::query(&insert)
            .bind(user_id)
            .bind(post_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to add reaction")?;
        Ok(true)
    }

    async fn exists(&self, kind: PostReaction, user_id: i64, post_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE user_id = ? AND post_id = ?) AS found",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check reaction")?;
        Ok(row.get("found"))
    }

    async fn count(&self, kind: PostReaction, post_id: i64) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS count FROM {} WHERE post_id = ?", kind.table());
        let row = sqlx::query(&sql)
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count reactions")?;
        Ok(row.get("count"))
    }

    async fn total_likes_for_author(&self, author_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM likes l JOIN posts p ON p.id = l.post_id
            WHERE p.author_id = ?
            "#,
        )
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count likes for author")?;
        Ok(row.get("count"))
    }

    async fn toggle_comment_like(&self, user_id: i64, comment_id: i64) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM comment_likes WHERE user_id = ? AND comment_id = ?")
            .bind(user_id)
            .bind(comment_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove comment like")?
            .rows_affected();
        if removed > 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO comment_likes (comment_id, user_id) VALUES (?, ?) \
             ON CONFLICT (comment_id, user_id) DO NOTHING",
        )
        .bind(comment_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to like comment")?;
        Ok(true)
    }

    async fn comment_likes(&self, comment_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM comment_likes WHERE comment_id = ?")
            .bind(comment_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count comment likes")?;
        Ok(row.get("count"))
    }
}
