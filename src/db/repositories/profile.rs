//! Profile and follow-graph repository

use crate::models::{Profile, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::user::row_to_summary;

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch the profile, creating an empty one if the row is missing
    async fn get_or_create(&self, user_id: i64) -> Result<Profile>;

    async fn update_bio(&self, user_id: i64, bio: &str) -> Result<()>;

    async fn update_avatar(&self, user_id: i64, avatar: &str) -> Result<()>;

    async fn is_following(&self, follower_id: i64, followee_id: i64) -> Result<bool>;

    /// Returns true when a new edge was added
    async fn follow(&self, follower_id: i64, followee_id: i64) -> Result<bool>;

    /// Returns true when an edge was removed
    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> Result<bool>;

    async fn followers_count(&self, user_id: i64) -> Result<i64>;

    async fn following_count(&self, user_id: i64) -> Result<i64>;

    async fn followers(&self, user_id: i64) -> Result<Vec<UserSummary>>;
}

pub struct SqlxProfileRepository {
    pool: SqlitePool,
}

impl SqlxProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn ProfileRepository> {
        Arc::new(Self::new(pool))
    }

    async fn count(&self, sql: &str, user_id: i64) -> Result<i64> {
        let row = sqlx::query(sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count follows")?;
        Ok(row.get("count"))
    }
}

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn get_or_create(&self, user_id: i64) -> Result<Profile> {
        sqlx::query("INSERT OR IGNORE INTO profiles (user_id, bio) VALUES (?, '')")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to ensure profile")?;

        let row = sqlx::query("SELECT user_id, bio, avatar FROM profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to get profile")?;

        Ok(Profile {
            user_id: row.get("user_id"),
            bio: row.get("bio"),
            avatar: row.get("avatar"),
        })
    }

    async fn update_bio(&self, user_id: i64, bio: &str) -> Result<()> {
        sqlx::query("UPDATE profiles SET bio = ? WHERE user_id = ?")
            .bind(bio)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update bio")?;
        Ok(())
    }

    async fn update_avatar(&self, user_id: i64, avatar: &str) -> Result<()> {
        sqlx::query("UPDATE profiles SET avatar = ? WHERE user_id = ?")
            .bind(avatar)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update avatar")?;
        Ok(())
    }

    async fn is_following(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ? AND followee_id = ?) AS found",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check follow")?;
        Ok(row.get("found"))
    }

    async fn follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to follow user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await
            .context("Failed to unfollow user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn followers_count(&self, user_id: i64) -> Result<i64> {
        self.count("SELECT COUNT(*) AS count FROM follows WHERE followee_id = ?", user_id)
            .await
    }

    async fn following_count(&self, user_id: i64) -> Result<i64> {
        self.count("SELECT COUNT(*) AS count FROM follows WHERE follower_id = ?", user_id)
            .await
    }

    async fn followers(&self, user_id: i64) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email, p.avatar
            FROM follows f
            JOIN users u ON u.id = f.follower_id
            LEFT JOIN profiles p ON p.user_id = u.id
            WHERE f.followee_id = ?
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list followers")?;

        Ok(rows.iter().map(|r| row_to_summary(r, "")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};

    #[tokio::test]
    async fn test_get_or_create_and_update() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "alice").await;
        let repo = SqlxProfileRepository::new(pool);

        let profile = repo.get_or_create(user_id).await.unwrap();
        assert_eq!(profile.bio, "");
        assert!(profile.avatar.is_none());

        repo.update_bio(user_id, "Hello there").await.unwrap();
        repo.update_avatar(user_id, "avatars/a.png").await.unwrap();

        let profile = repo.get_or_create(user_id).await.unwrap();
        assert_eq!(profile.bio, "Hello there");
        assert_eq!(profile.avatar.as_deref(), Some("avatars/a.png"));
    }

    #[tokio::test]
    async fn test_follow_graph() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let repo = SqlxProfileRepository::new(pool);

        assert!(repo.follow(alice, bob).await.unwrap());
        assert!(!repo.follow(alice, bob).await.unwrap());
        assert!(repo.is_following(alice, bob).await.unwrap());
        assert!(!repo.is_following(bob, alice).await.unwrap());
        assert_eq!(repo.followers_count(bob).await.unwrap(), 1);
        assert_eq!(repo.following_count(alice).await.unwrap(), 1);

        let followers = repo.followers(bob).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].username, "alice");

        assert!(repo.unfollow(alice, bob).await.unwrap());
        assert!(!repo.unfollow(alice, bob).await.unwrap());
        assert_eq!(repo.followers_count(bob).await.unwrap(), 0);
    }
}
