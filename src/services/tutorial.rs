//! Tutorials
//!
//! Listing follows the project showcase rules. A tutorial someone else wrote
//! cannot be edited or deleted and is reported as not found.

use crate::db::repositories::{ShowcaseFilter, TutorialRepository};
use crate::models::{ListParams, PagedResult, Tutorial, TutorialInput, User};
use crate::services::error::{require_text, ContentError};
use chrono::Utc;
use std::sync::Arc;

pub const TUTORIALS_PER_PAGE: u32 = 9;

const MAX_TITLE_LEN: usize = 200;

pub struct TutorialService {
    repo: Arc<dyn TutorialRepository>,
}

impl TutorialService {
    pub fn new(repo: Arc<dyn TutorialRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        params: ListParams,
    ) -> Result<PagedResult<Tutorial>, ContentError> {
        let filter = match viewer {
            Some(_) => ShowcaseFilter::default(),
            None => ShowcaseFilter::featured(),
        };
        let total = self.repo.count(filter).await?;
        let params = params.clamp_to(total);
        let items = self.repo.list(filter, Some(&params)).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    /// Newest featured tutorials written by `author`
    pub async fn featured_by(&self, author: &User, limit: u32) -> Result<Vec<Tutorial>, ContentError> {
        let filter = ShowcaseFilter {
            featured_only: true,
            author_id: Some(author.id),
        };
        Ok(self
            .repo
            .list(filter, Some(&ListParams::new(1, limit)))
            .await?)
    }

    pub async fn by_author(&self, author: &User) -> Result<Vec<Tutorial>, ContentError> {
        Ok(self.repo.list(ShowcaseFilter::by_author(author.id), None).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Tutorial, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::not_found("Tutorial"))
    }

    pub async fn create(&self, author: &User, input: TutorialInput) -> Result<Tutorial, ContentError> {
        validate(&input)?;
        let tutorial = Tutorial {
            id: 0,
            title: input.title.trim().to_string(),
            content: input.content,
            difficulty: input.difficulty,
            author_id: author.id,
            featured: input.featured,
            created_at: Utc::now(),
        };
        let tutorial = self.repo.create(&tutorial).await?;
        tracing::info!("User {} created tutorial {}", author.id, tutorial.id);
        Ok(tutorial)
    }

    pub async fn update(
        &self,
        id: i64,
        editor: &User,
        input: TutorialInput,
    ) -> Result<Tutorial, ContentError> {
        let existing = self.owned(id, editor).await?;
        validate(&input)?;
        let tutorial = Tutorial {
            title: input.title.trim().to_string(),
            content: input.content,
            difficulty: input.difficulty,
            featured: input.featured,
            ..existing
        };
        self.repo.update(&tutorial).await?;
        Ok(tutorial)
    }

    pub async fn delete(&self, id: i64, editor: &User) -> Result<(), ContentError> {
        let tutorial = self.owned(id, editor).await?;
        self.repo.delete(tutorial.id).await?;
        Ok(())
    }

    async fn owned(&self, id: i64, editor: &User) -> Result<Tutorial, ContentError> {
        match self.repo.get_by_id(id).await? {
            Some(tutorial) if tutorial.author_id == editor.id => Ok(tutorial),
            _ => Err(ContentError::not_found("Tutorial")),
        }
    }
}

fn validate(input: &TutorialInput) -> Result<(), ContentError> {
    require_text("Title", &input.title, MAX_TITLE_LEN)?;
    if input.content.trim().is_empty() {
        return Err(ContentError::validation("Content is required"));
    }
    Ok(())
}
