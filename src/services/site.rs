//! Home page and personal dashboard
//!
//! Both pages are aggregates over the other services.

use crate::models::{
    Category, Comment, Notification, PostSummary, Profile, Project, Tutorial, User,
};
use crate::services::error::ContentError;
use crate::services::{
    CategoryService, CommentService, PostService, ProjectService, SocialService, TutorialService,
};
use serde::Serialize;
use std::sync::Arc;

const HOME_FEATURED_LIMIT: u32 = 3;
const DASHBOARD_RECENT_LIMIT: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct HomePage {
    pub categories: Vec<Category>,
    pub featured_posts: Vec<PostSummary>,
    pub projects: Vec<Project>,
    /// The viewer's own featured tutorials; empty when anonymous
    pub tutorials: Vec<Tutorial>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub profile: Profile,
    pub posts: Vec<PostSummary>,
    pub projects: Vec<Project>,
    pub tutorials: Vec<Tutorial>,
    pub total_likes: i64,
    pub total_comments: i64,
    pub recent_comments: Vec<Comment>,
    pub notifications: Vec<Notification>,
}

pub struct SiteService {
    categories: Arc<CategoryService>,
    posts: Arc<PostService>,
    comments: Arc<CommentService>,
    projects: Arc<ProjectService>,
    tutorials: Arc<TutorialService>,
    social: Arc<SocialService>,
}

impl SiteService {
    pub fn new(
        categories: Arc<CategoryService>,
        posts: Arc<PostService>,
        comments: Arc<CommentService>,
        projects: Arc<ProjectService>,
        tutorials: Arc<TutorialService>,
        social: Arc<SocialService>,
    ) -> Self {
        Self {
            categories,
            posts,
            comments,
            projects,
            tutorials,
            social,
        }
    }

    pub async fn home(&self, viewer: Option<&User>) -> Result<HomePage, ContentError> {
        let tutorials = match viewer {
            Some(user) => self.tutorials.featured_by(user, HOME_FEATURED_LIMIT).await?,
            None => Vec::new(),
        };

        Ok(HomePage {
            categories: self.categories.list().await?,
            featured_posts: self.posts.featured(viewer, HOME_FEATURED_LIMIT).await?,
            projects: self.projects.featured(HOME_FEATURED_LIMIT).await?,
            tutorials,
        })
    }

    pub async fn dashboard(&self, user: &User) -> Result<Dashboard, ContentError> {
        Ok(Dashboard {
            profile: self.social.get_profile(user).await?,
            posts: self.posts.by_author(user).await?,
            projects: self.projects.by_author(user).await?,
            tutorials: self.tutorials.by_author(user).await?,
            total_likes: self.posts.total_likes(user).await?,
            total_comments: self.comments.received_count(user).await?,
            recent_comments: self.comments.recent_by(user, DASHBOARD_RECENT_LIMIT).await?,
            notifications: self.social.unread(user, DASHBOARD_RECENT_LIMIT).await?,
        })
    }
}
