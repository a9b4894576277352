//! Follows, profiles and notifications

use crate::db::repositories::{
    NotificationRepository, PostFilter, PostRepository, ProfileRepository, UserRepository,
};
use crate::models::{
    avatar_url, NewNotification, Notification, NotificationType, PostSummary, Profile, User,
    UserSummary,
};
use crate::services::error::{limit_text, ContentError};
use crate::services::media::{MediaStore, UploadedFile, AVATAR_DIR};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

pub const MAX_BIO_LEN: usize = 500;

/// Writes notifications, skipping the ones a user would send to themselves
#[derive(Clone)]
pub struct Notifier {
    repo: Arc<dyn NotificationRepository>,
}

impl Notifier {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn notify(
        &self,
        sender_id: i64,
        recipient_id: i64,
        notification_type: NotificationType,
        post_id: Option<i64>,
        comment_id: Option<i64>,
    ) -> anyhow::Result<()> {
        if sender_id == recipient_id {
            return Ok(());
        }
        self.repo
            .create(&NewNotification {
                recipient_id,
                sender_id,
                notification_type,
                post_id,
                comment_id,
            })
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowOutcome {
    pub is_following: bool,
    pub followers_count: i64,
}

/// A user's public page as seen by the viewer
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user: UserSummary,
    pub bio: String,
    pub posts: Vec<PostSummary>,
    pub is_own_profile: bool,
    pub post_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
    pub is_following: bool,
}

pub struct SocialService {
    users: Arc<dyn UserRepository>,
    profiles: Arc<dyn ProfileRepository>,
    posts: Arc<dyn PostRepository>,
    notifications: Arc<dyn NotificationRepository>,
    notifier: Notifier,
    media: Arc<MediaStore>,
}

impl SocialService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        profiles: Arc<dyn ProfileRepository>,
        posts: Arc<dyn PostRepository>,
        notifications: Arc<dyn NotificationRepository>,
        media: Arc<MediaStore>,
    ) -> Self {
        Self {
            users,
            profiles,
            posts,
            notifier: Notifier::new(notifications.clone()),
            notifications,
            media,
        }
    }

    /// Follow `target_id`, or unfollow when already following
    pub async fn toggle_follow(
        &self,
        actor: &User,
        target_id: i64,
    ) -> Result<FollowOutcome, ContentError> {
        let target = self
            .users
            .get_by_id(target_id)
            .await?
            .ok_or_else(|| ContentError::not_found("User"))?;

        if target.id == actor.id {
            return Err(ContentError::validation("You cannot follow yourself"));
        }

        let is_following = if self.profiles.is_following(actor.id, target.id).await? {
            self.profiles.unfollow(actor.id, target.id).await?;
            false
        } else {
            if self.profiles.follow(actor.id, target.id).await? {
                self.notifier
                    .notify(actor.id, target.id, NotificationType::Follow, None, None)
                    .await?;
            }
            true
        };

        Ok(FollowOutcome {
            is_following,
            followers_count: self.profiles.followers_count(target.id).await?,
        })
    }

    pub async fn profile(&self, username: &str, viewer: &User) -> Result<ProfileView, ContentError> {
        let user = self
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| ContentError::not_found("User"))?;
        let profile = self.profiles.get_or_create(user.id).await?;

        let filter = PostFilter {
            author_id: Some(user.id),
            ..Default::default()
        };
        let posts = self
            .posts
            .list_visible(&filter, Some(viewer.id), None)
            .await?;

        Ok(ProfileView {
            user: UserSummary::new(user.id, user.username.clone(), &user.email, profile.avatar.as_deref()),
            bio: profile.bio,
            post_count: posts.len() as i64,
            posts,
            is_own_profile: user.id == viewer.id,
            followers_count: self.profiles.followers_count(user.id).await?,
            following_count: self.profiles.following_count(user.id).await?,
            is_following: self.profiles.is_following(viewer.id, user.id).await?,
        })
    }

    pub async fn get_profile(&self, user: &User) -> Result<Profile, ContentError> {
        Ok(self.profiles.get_or_create(user.id).await?)
    }

    pub async fn update_bio(&self, user: &User, bio: &str) -> Result<Profile, ContentError> {
        limit_text("Bio", bio, MAX_BIO_LEN)?;
        self.profiles.get_or_create(user.id).await?;
        self.profiles.update_bio(user.id, bio).await?;
        Ok(self.profiles.get_or_create(user.id).await?)
    }

    /// Replace the avatar, returning its public URL
    pub async fn update_avatar(
        &self,
        user: &User,
        file: &UploadedFile,
    ) -> Result<String, ContentError> {
        let previous = self.profiles.get_or_create(user.id).await?.avatar;
        let stored = self.media.save(AVATAR_DIR, file, false).await?;
        self.profiles
            .update_avatar(user.id, &stored.path)
            .await
            .context("Failed to save avatar")?;

        if let Some(old) = previous.filter(|p| !p.is_empty()) {
            if let Err(e) = self.media.remove(&old).await {
                tracing::warn!("Failed to remove old avatar {}: {}", old, e);
            }
        }
        Ok(avatar_url(&user.email, Some(&stored.path)))
    }

    /// Every notification, newest first, as it was before this call
    ///
    /// Unread notifications are marked read afterwards.
    pub async fn notifications(&self, user: &User) -> Result<Vec<Notification>, ContentError> {
        let notifications = self.notifications.list_for_user(user.id).await?;
        let marked = self.notifications.mark_all_read(user.id).await?;
        if marked > 0 {
            tracing::debug!("Marked {} notifications read for user {}", marked, user.id);
        }
        Ok(notifications)
    }

    /// Newest unread notifications, left unread
    pub async fn unread(&self, user: &User, limit: i64) -> Result<Vec<Notification>, ContentError> {
        Ok(self.notifications.unread(user.id, limit).await?)
    }

    pub async fn unread_count(&self, user: &User) -> Result<i64, ContentError> {
        Ok(self.notifications.unread_count(user.id).await?)
    }

    pub async fn followers(&self, user_id: i64) -> Result<Vec<UserSummary>, ContentError> {
        Ok(self.profiles.followers(user_id).await?)
    }
}
