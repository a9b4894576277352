//! Project repository

use crate::models::{ListParams, Project};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Filter shared by project and tutorial listings
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowcaseFilter {
    pub featured_only: bool,
    pub author_id: Option<i64>,
}

impl ShowcaseFilter {
    pub fn featured() -> Self {
        Self {
            featured_only: true,
            author_id: None,
        }
    }

    pub fn by_author(author_id: i64) -> Self {
        Self {
            featured_only: false,
            author_id: Some(author_id),
        }
    }

    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if self.featured_only {
            qb.push(" AND featured = 1");
        }
        if let Some(author_id) = self.author_id {
            qb.push(" AND author_id = ");
            qb.push_bind(author_id);
        }
    }
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> Result<Project>;

    async fn update(&self, project: &Project) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>>;

    async fn count(&self, filter: ShowcaseFilter) -> Result<i64>;

    /// Newest first; `None` params returns every match
    async fn list(&self, filter: ShowcaseFilter, params: Option<&ListParams>)
        -> Result<Vec<Project>>;
}

pub struct SqlxProjectRepository {
    pool: SqlitePool,
}

impl SqlxProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn ProjectRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProjectRepository for SqlxProjectRepository {
    async fn create(&self, project: &Project) -> Result<Project> {
        let result = sqlx::query(
            r#"
            INSERT INTO projects (title, description, link, featured, author_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.link)
        .bind(project.featured)
        .bind(project.author_id)
        .bind(project.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create project")?;

        Ok(Project {
            id: result.last_insert_rowid(),
            ..project.clone()
        })
    }

    async fn update(&self, project: &Project) -> Result<()> {
        sqlx::query(
            "UPDATE projects SET title = ?, description = ?, link = ?, featured = ? WHERE id = ?",
        )
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.link)
        .bind(project.featured)
        .bind(project.id)
        .execute(&self.pool)
        .await
        .context("Failed to update project")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete project")?;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, title, description, link, featured, author_id, created_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get project")?;
        Ok(row.as_ref().map(row_to_project))
    }

    async fn count(&self, filter: ShowcaseFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM projects");
        filter.push_where(&mut qb);
        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count projects")?;
        Ok(row.get("count"))
    }

    async fn list(
        &self,
        filter: ShowcaseFilter,
        params: Option<&ListParams>,
    ) -> Result<Vec<Project>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, title, description, link, featured, author_id, created_at FROM projects",
        );
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
            .context("Failed to list projects")?;
        Ok(rows.iter().map(row_to_project).collect())
    }
}

fn row_to_project(row: &SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        link: row.get("link"),
        featured: row.get("featured"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
    }
}
