//! Tutorial repository

use crate::models::{ListParams, Tutorial};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::project::ShowcaseFilter;

const TUTORIAL_COLUMNS: &str = "id, title, content, difficulty, author_id, featured, created_at";

#[async_trait]
pub trait TutorialRepository: Send + Sync {
    async fn create(&self, tutorial: &Tutorial) -> Result<Tutorial>;

    async fn update(&self, tutorial: &Tutorial) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tutorial>>;

    async fn count(&self, filter: ShowcaseFilter) -> Result<i64>;

    /// Newest first; `None` params returns every match
    async fn list(
        &self,
        filter: ShowcaseFilter,
        params: Option<&ListParams>,
    ) -> Result<Vec<Tutorial>>;
}

pub struct SqlxTutorialRepository {
    pool: SqlitePool,
}

impl SqlxTutorialRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn TutorialRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TutorialRepository for SqlxTutorialRepository {
    async fn create(&self, tutorial: &Tutorial) -> Result<Tutorial> {
        let result = sqlx::query(
            r#"
            INSERT INTO tutorials (title, content, difficulty, author_id, featured, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tutorial.title)
        .bind(&tutorial.content)
        .bind(tutorial.difficulty.to_string())
        .bind(tutorial.author_id)
        .bind(tutorial.featured)
        .bind(tutorial.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create tutorial")?;

        Ok(Tutorial {
            id: result.last_insert_rowid(),
            ..tutorial.clone()
        })
    }

    async fn update(&self, tutorial: &Tutorial) -> Result<()> {
        sqlx::query(
            "UPDATE tutorials SET title = ?, content = ?, difficulty = ?, featured = ? WHERE id = ?",
        )
        .bind(&tutorial.title)
        .bind(&tutorial.content)
        .bind(tutorial.difficulty.to_string())
        .bind(tutorial.featured)
        .bind(tutorial.id)
        .execute(&self.pool)
        .await
        .context("Failed to update tutorial")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tutorials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete tutorial")?;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tutorial>> {
        let sql = format!("SELECT {} FROM tutorials WHERE id = ?", TUTORIAL_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tutorial")?;
        row.map(|r| row_to_tutorial(&r)).transpose()
    }

    async fn count(&self, filter: ShowcaseFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM tutorials");
        filter.push_where(&mut qb);
        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count tutorials")?;
        Ok(row.get("count"))
    }

    async fn list(
        &self,
        filter: ShowcaseFilter,
        params: Option<&ListParams>,
    ) -> Result<Vec<Tutorial>> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM tutorials", TUTORIAL_COLUMNS));
        filter.push_where(&mut qb);
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(params) = params {
            qb.push(" LIMIT ");
            qb.push_bind(params.limit());
            qb.push(" OFFSET ");
            qb.push_bind(params.offset());
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tutorials")?;
        rows.iter().map(row_to_tutorial).collect()
    }
}

fn row_to_tutorial(row: &SqliteRow) -> Result<Tutorial> {
    let difficulty: String = row.get("difficulty");
    Ok(Tutorial {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        difficulty: difficulty.parse()?,
        author_id: row.get("author_id"),
        featured: row.get("featured"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::models::Difficulty;
    use chrono::Utc;

    #[tokio::test]
    async fn test_tutorial_crud() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let repo = SqlxTutorialRepository::new(pool);

        let mut tutorial = repo
            .create(&Tutorial {
                id: 0,
                title: "Ownership".into(),
                content: "Borrow".into(),
                difficulty: Difficulty::Advanced,
                author_id: alice,
                featured: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        repo.create(&Tutorial {
            id: 0,
            title: "Hello".into(),
            content: "World".into(),
            difficulty: Difficulty::Beginner,
            author_id: bob,
            featured: false,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let fetched = repo.get_by_id(tutorial.id).await.unwrap().unwrap();
        assert_eq!(fetched.difficulty, Difficulty::Advanced);

        assert_eq!(repo.count(ShowcaseFilter::default()).await.unwrap(), 2);
        assert_eq!(repo.count(ShowcaseFilter::featured()).await.unwrap(), 1);
        let featured_by_alice = ShowcaseFilter {
            featured_only: true,
            author_id: Some(alice),
        };
        assert_eq!(repo.list(featured_by_alice, None).await.unwrap().len(), 1);

        tutorial.difficulty = Difficulty::Intermediate;
        repo.update(&tutorial).await.unwrap();
        assert_eq!(
            repo.get_by_id(tutorial.id).await.unwrap().unwrap().difficulty,
            Difficulty::Intermediate
        );

        repo.delete(tutorial.id).await.unwrap();
        assert!(repo.get_by_id(tutorial.id).await.unwrap().is_none());
    }
}
