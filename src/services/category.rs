//! Category service
//!
//! Categories change rarely, so the full list is cached and dropped on every
//! write.

use crate::cache::{CacheLayer, MemoryCache};
use crate::db::repositories::CategoryRepository;
use crate::models::Category;
use crate::services::error::{limit_text, require_text, ContentError};
use std::sync::Arc;
use std::time::Duration;

/// Cache TTL for the category list (1 hour)
const CATEGORY_CACHE_TTL_SECS: u64 = 3600;

const CACHE_KEY_CATEGORY_LIST: &str = "category:list";

const MAX_NAME_LEN: usize = 50;
const MAX_ICON_LEN: usize = 50;

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { repo, cache }
    }

    /// All categories ordered by name
    pub async fn list(&self) -> Result<Vec<Category>, ContentError> {
        let cached: Option<Vec<Category>> = self.cache.get(CACHE_KEY_CATEGORY_LIST).await?;
        if let Some(categories) = cached {
            return Ok(categories);
        }

        let categories = self.repo.list().await?;
        self.cache
            .set(
                CACHE_KEY_CATEGORY_LIST,
                &categories,
                Duration::from_secs(CATEGORY_CACHE_TTL_SECS),
            )
            .await?;
        Ok(categories)
    }

    pub async fn create(&self, name: &str, icon: &str) -> Result<Category, ContentError> {
        let name = name.trim();
        require_text("Name", name, MAX_NAME_LEN)?;
        limit_text("Icon", icon, MAX_ICON_LEN)?;

        if self.repo.get_by_name(name).await?.is_some() {
            return Err(ContentError::Conflict(format!(
                "Category '{}' already exists",
                name
            )));
        }

        let category = self.repo.create(name, icon.trim()).await?;
        self.cache.delete(CACHE_KEY_CATEGORY_LIST).await?;
        tracing::info!("Created category {} ({})", category.name, category.id);
        Ok(category)
    }

    /// Delete a category; its posts become uncategorised
    pub async fn delete(&self, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(id).await? {
            return Err(ContentError::not_found("Category"));
        }
        self.cache.delete(CACHE_KEY_CATEGORY_LIST).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::SqlxCategoryRepository;

    async fn setup() -> CategoryService {
        let pool = setup_pool().await;
        CategoryService::new(
            SqlxCategoryRepository::boxed(pool),
            Arc::new(MemoryCache::new()),
        )
    }

    #[tokio::test]
    async fn test_list_is_refreshed_after_writes() {
        let service = setup().await;
        assert!(service.list().await.unwrap().is_empty());

        let travel = service.create("Travel", "✈️").await.unwrap();
        service.create("Code", "💻").await.unwrap();
        let names: Vec<String> = service.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Code", "Travel"]);

        service.delete(travel.id).await.unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);
        assert!(matches!(
            service.delete(travel.id).await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let service = setup().await;
        service.create("Code", "💻").await.unwrap();

        assert!(matches!(
            service.create("Code", "x").await,
            Err(ContentError::Conflict(_))
        ));
        assert!(matches!(
            service.create(" ", "x").await,
            Err(ContentError::Validation(_))
        ));
        assert!(service.create(&"n".repeat(51), "x").await.is_err());
    }
}
