//! Fixtures shared by repository and service tests

use crate::db::{create_test_pool, migrations};
use crate::models::{slugify, Privacy};
use chrono::Utc;
use sqlx::SqlitePool;

/// Migrated in-memory pool
pub async fn setup_pool() -> SqlitePool {
    let pool = create_test_pool().await.unwrap();
    migrations::run_migrations(&pool).await.unwrap();
    pool
}

/// Insert a user with an empty profile and `{username}@example.com`
pub async fn insert_user(pool: &SqlitePool, username: &str) -> i64 {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, is_staff, created_at, updated_at)
        VALUES (?, ?, 'hash', 0, ?, ?)
        "#,
    )
    .bind(username)
    .bind(format!("{}@example.com", username))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    sqlx::query("INSERT INTO profiles (user_id, bio) VALUES (?, '')")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

/// Insert a post whose slug is derived from the title
pub async fn insert_post(pool: &SqlitePool, author_id: i64, title: &str, privacy: Privacy) -> i64 {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO posts (title, slug, author_id, content, privacy, created_at, updated_at)
        VALUES (?, ?, ?, 'Body', ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(slugify(title))
    .bind(author_id)
    .bind(privacy.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn follow(pool: &SqlitePool, follower_id: i64, followee_id: i64) {
    sqlx::query("INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)")
        .bind(follower_id)
        .bind(followee_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
}
