//! Project showcase
//!
//! Signed-in visitors see every project, anonymous visitors only the
//! featured ones. Only the author may change a project.

use crate::db::repositories::{ProjectRepository, ShowcaseFilter};
use crate::models::{ListParams, PagedResult, Project, ProjectInput, User};
use crate::services::error::{require_text, ContentError};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub const PROJECTS_PER_PAGE: u32 = 9;

const MAX_TITLE_LEN: usize = 200;
const MAX_LINK_LEN: usize = 200;

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://[^\s/?#.][^\s]*$").expect("valid regex"));

pub struct ProjectService {
    repo: Arc<dyn ProjectRepository>,
}

impl ProjectService {
    pub fn new(repo: Arc<dyn ProjectRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        params: ListParams,
    ) -> Result<PagedResult<Project>, ContentError> {
        let filter = match viewer {
            Some(_) => ShowcaseFilter::default(),
            None => ShowcaseFilter::featured(),
        };
        let total = self.repo.count(filter).await?;
        let params = params.clamp_to(total);
        let items = self.repo.list(filter, Some(&params)).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    pub async fn featured(&self, limit: u32) -> Result<Vec<Project>, ContentError> {
        Ok(self
            .repo
            .list(ShowcaseFilter::featured(), Some(&ListParams::new(1, limit)))
            .await?)
    }

    pub async fn by_author(&self, author: &User) -> Result<Vec<Project>, ContentError> {
        Ok(self.repo.list(ShowcaseFilter::by_author(author.id), None).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Project, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::not_found("Project"))
    }

    pub async fn create(&self, author: &User, input: ProjectInput) -> Result<Project, ContentError> {
        let input = validate(input)?;
        let project = Project {
            id: 0,
            title: input.title,
            description: input.description,
            link: input.link,
            featured: input.featured,
            author_id: Some(author.id),
            created_at: Utc::now(),
        };
        let project = self.repo.create(&project).await?;
        tracing::info!("User {} created project {}", author.id, project.id);
        Ok(project)
    }

    pub async fn update(
        &self,
        id: i64,
        editor: &User,
        input: ProjectInput,
    ) -> Result<Project, ContentError> {
        let existing = self.owned(id, editor, "edit").await?;
        let input = validate(input)?;
        let project = Project {
            title: input.title,
            description: input.description,
            link: input.link,
            featured: input.featured,
            ..existing
        };
        self.repo.update(&project).await?;
        Ok(project)
    }

    pub async fn delete(&self, id: i64, editor: &User) -> Result<(), ContentError> {
        let project = self.owned(id, editor, "delete").await?;
        self.repo.delete(project.id).await?;
        Ok(())
    }

    async fn owned(&self, id: i64, editor: &User, action: &str) -> Result<Project, ContentError> {
        let project = self.get(id).await?;
        if project.author_id != Some(editor.id) {
            return Err(ContentError::Forbidden(format!(
                "You don't have permission to {} this project.",
                action
            )));
        }
        Ok(project)
    }
}

fn validate(input: ProjectInput) -> Result<ProjectInput, ContentError> {
    require_text("Title", &input.title, MAX_TITLE_LEN)?;
    if input.description.trim().is_empty() {
        return Err(ContentError::validation("Description is required"));
    }

    let link = input.link.trim().to_string();
    if !link.is_empty() && (link.len() > MAX_LINK_LEN || !LINK_RE.is_match(&link)) {
        return Err(ContentError::validation("Enter a valid URL."));
    }

    Ok(ProjectInput {
        title: input.title.trim().to_string(),
        link,
        ..input
    })
}
