//! Services layer - Business logic
//!
//! Services implement the rules of the site on top of the repositories and
//! the cache:
//! - accounts, sessions and the email code login step
//! - posts, comments, follows and notifications
//! - the project and tutorial showcase
//! - categories, contact form and newsletter

pub mod category;
pub mod comment;
pub mod contact;
pub mod email;
pub mod error;
pub mod media;
pub mod password;
pub mod post;
pub mod project;
pub mod site;
pub mod social;
pub mod tutorial;
pub mod two_factor;
pub mod user;

pub use category::CategoryService;
pub use comment::CommentService;
pub use contact::ContactService;
pub use email::{mailer_from_config, EmailService, Mailer, MemoryMailer};
pub use error::ContentError;
pub use media::{MediaStore, UploadedFile};
pub use password::{hash_password, verify_password};
pub use post::{PostService, ReactionOutcome, POSTS_PER_PAGE};
pub use project::{ProjectService, PROJECTS_PER_PAGE};
pub use site::{Dashboard, HomePage, SiteService};
pub use social::{FollowOutcome, Notifier, ProfileView, SocialService};
pub use tutorial::{TutorialService, TUTORIALS_PER_PAGE};
pub use two_factor::{TwoFactorError, TwoFactorService};
pub use user::{LoginInput, LoginOutcome, RegisterInput, UserService, UserServiceError};

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxContactRepository,
    SqlxLoginAttemptRepository, SqlxNotificationRepository, SqlxPostRepository,
    SqlxProfileRepository, SqlxProjectRepository, SqlxReactionRepository, SqlxSessionRepository,
    SqlxTutorialRepository, SqlxTwoFactorRepository, SqlxUserRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Every service, wired to one pool, cache and mailer
#[derive(Clone)]
pub struct Services {
    pub users: Arc<UserService>,
    pub two_factor: Arc<TwoFactorService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub social: Arc<SocialService>,
    pub projects: Arc<ProjectService>,
    pub tutorials: Arc<TutorialService>,
    pub categories: Arc<CategoryService>,
    pub contact: Arc<ContactService>,
    pub site: Arc<SiteService>,
}

impl Services {
    pub fn build(
        pool: &SqlitePool,
        cache: Arc<MemoryCache>,
        config: &Config,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let profile_repo = SqlxProfileRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());
        let reaction_repo = SqlxReactionRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let notification_repo = SqlxNotificationRepository::boxed(pool.clone());

        let media = Arc::new(MediaStore::new(config.upload.clone()));
        let notifier = Notifier::new(notification_repo.clone());
        let email = Arc::new(EmailService::new(mailer, config.email.site_name.clone())?);

        let two_factor = Arc::new(TwoFactorService::new(
            SqlxTwoFactorRepository::boxed(pool.clone()),
            SqlxLoginAttemptRepository::boxed(pool.clone()),
            cache.clone(),
            email,
            config.security.clone(),
        ));
        let users = Arc::new(UserService::new(
            user_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            profile_repo.clone(),
            two_factor.clone(),
            cache.clone(),
            config.security.clone(),
        ));
        let posts = Arc::new(PostService::new(
            post_repo.clone(),
            reaction_repo.clone(),
            comment_repo.clone(),
            category_repo.clone(),
            user_repo.clone(),
            notifier.clone(),
            media.clone(),
        ));
        let comments = Arc::new(CommentService::new(
            comment_repo,
            post_repo.clone(),
            reaction_repo,
            notifier,
        ));
        let social = Arc::new(SocialService::new(
            user_repo,
            profile_repo,
            post_repo,
            notification_repo,
            media,
        ));
        let projects = Arc::new(ProjectService::new(SqlxProjectRepository::boxed(pool.clone())));
        let tutorials = Arc::new(TutorialService::new(SqlxTutorialRepository::boxed(pool.clone())));
        let categories = Arc::new(CategoryService::new(category_repo, cache));
        let contact = Arc::new(ContactService::new(SqlxContactRepository::boxed(pool.clone())));
        let site = Arc::new(SiteService::new(
            categories.clone(),
            posts.clone(),
            comments.clone(),
            projects.clone(),
            tutorials.clone(),
            social.clone(),
        ));

        Ok(Self {
            users,
            two_factor,
            posts,
            comments,
            social,
            projects,
            tutorials,
            categories,
            contact,
            site,
        })
    }
}
