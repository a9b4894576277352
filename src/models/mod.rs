//! Data models
//!
//! Database rows, joined read models and the input structs accepted by the
//! services.

mod comment;
mod contact;
mod notification;
mod pagination;
mod post;
mod project;
mod security;
mod session;
mod user;

pub use comment::{format_display_time, Comment};
pub use contact::{ContactInput, ContactMessage, NewsletterSubscriber};
pub use notification::{NewNotification, Notification, NotificationType};
pub use pagination::{ListParams, PagedResult};
pub use post::{
    slugify, Category, Feeling, MediaType, Post, PostDetail, PostInput, PostMedia, PostSummary,
    Privacy,
};
pub use project::{Difficulty, Project, ProjectInput, Tutorial, TutorialInput};
pub use security::{
    ClientInfo, LoginAttempt, NewLoginAttempt, SecurityCheck, SecurityOverview, TwoFactorCode,
};
pub use session::Session;
pub use user::{avatar_url, Profile, User, UserSummary};
