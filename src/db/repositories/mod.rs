//! Database repositories
//!
//! One trait per aggregate with an SQLx implementation. Services depend on
//! the traits through `Arc<dyn ...>` handles built with `boxed`.

pub mod category;
pub mod comment;
pub mod contact;
pub mod notification;
pub mod post;
pub mod profile;
pub mod project;
pub mod reaction;
pub mod security;
pub mod session;
pub mod tutorial;
pub mod user;

#[cfg(test)]
pub mod test_support;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use contact::{ContactRepository, SqlxContactRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use post::{PostFilter, PostRepository, SqlxPostRepository};
pub use profile::{ProfileRepository, SqlxProfileRepository};
pub use project::{ProjectRepository, ShowcaseFilter, SqlxProjectRepository};
pub use reaction::{PostReaction, ReactionRepository, SqlxReactionRepository};
pub use security::{
    LoginAttemptRepository, SqlxLoginAttemptRepository, SqlxTwoFactorRepository,
    TwoFactorRepository,
};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tutorial::{SqlxTutorialRepository, TutorialRepository};
pub use user::{SqlxUserRepository, UserRepository};
