//! Post service
//!
//! Blog posts with privacy, tagged users, media attachments and reactions.
//! A post the caller may not see, or may not edit, is reported as not found.

use crate::db::repositories::{
    CategoryRepository, CommentRepository, PostFilter, PostReaction, PostRepository,
    ReactionRepository, UserRepository,
};
use crate::models::{
    slugify, ListParams, MediaType, NotificationType, PagedResult, Post, PostDetail, PostInput,
    PostMedia, PostSummary, User,
};
use crate::config::MediaKind;
use crate::services::error::{limit_text, require_text, ContentError};
use crate::services::media::{MediaStore, UploadedFile, POST_MEDIA_DIR};
use crate::services::social::Notifier;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Posts per blog page
pub const POSTS_PER_PAGE: u32 = 5;

const MAX_TITLE_LEN: usize = 200;
const MAX_LOCATION_LEN: usize = 100;
const MAX_ACTIVITY_LEN: usize = 100;

/// State of a like or share after toggling it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReactionOutcome {
    pub active: bool,
    pub count: i64,
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    reactions: Arc<dyn ReactionRepository>,
    comments: Arc<dyn CommentRepository>,
    categories: Arc<dyn CategoryRepository>,
    users: Arc<dyn UserRepository>,
    notifier: Notifier,
    media: Arc<MediaStore>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        reactions: Arc<dyn ReactionRepository>,
        comments: Arc<dyn CommentRepository>,
        categories: Arc<dyn CategoryRepository>,
        users: Arc<dyn UserRepository>,
        notifier: Notifier,
        media: Arc<MediaStore>,
    ) -> Self {
        Self {
            posts,
            reactions,
            comments,
            categories,
            users,
            notifier,
            media,
        }
    }

    /// Blog listing with optional search text and category name
    ///
    /// Pages past the end clamp to the last page.
    pub async fn list(
        &self,
        filter: &PostFilter,
        viewer: Option<&User>,
        params: ListParams,
    ) -> Result<PagedResult<PostSummary>, ContentError> {
        let viewer_id = viewer.map(|u| u.id);
        let total = self.posts.count_visible(filter, viewer_id).await?;
        let params = params.clamp_to(total);
        let items = self
            .posts
            .list_visible(filter, viewer_id, Some(&params))
            .await?;
        Ok(PagedResult::new(items, total, &params))
    }

    /// Every visible post matching `query`; a blank query matches nothing
    pub async fn search(
        &self,
        query: &str,
        viewer: Option<&User>,
    ) -> Result<Vec<PostSummary>, ContentError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let filter = PostFilter {
            query: Some(query.to_string()),
            ..Default::default()
        };
        Ok(self
            .posts
            .list_visible(&filter, viewer.map(|u| u.id), None)
            .await?)
    }

    /// Newest featured posts visible to the viewer
    pub async fn featured(
        &self,
        viewer: Option<&User>,
        limit: u32,
    ) -> Result<Vec<PostSummary>, ContentError> {
        let filter = PostFilter {
            featured_only: true,
            ..Default::default()
        };
        Ok(self
            .posts
            .list_visible(&filter, viewer.map(|u| u.id), Some(&ListParams::new(1, limit)))
            .await?)
    }

    /// Every post written by `author`, newest first
    pub async fn by_author(&self, author: &User) -> Result<Vec<PostSummary>, ContentError> {
        let filter = PostFilter {
            author_id: Some(author.id),
            ..Default::default()
        };
        Ok(self.posts.list_visible(&filter, Some(author.id), None).await?)
    }

    pub async fn detail(&self, slug: &str, viewer: Option<&User>) -> Result<PostDetail, ContentError> {
        let viewer_id = viewer.map(|u| u.id);
        let post = self
            .posts
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| ContentError::not_found("Post"))?;
        if !self.posts.is_visible(post.id, viewer_id).await? {
            return Err(ContentError::not_found("Post"));
        }

        let author = self
            .users
            .summary(post.author_id)
            .await?
            .ok_or_else(|| ContentError::not_found("Author"))?;
        let category = match post.category_id {
            Some(id) => self.categories.get_by_id(id).await?,
            None => None,
        };
        let (is_liked, is_shared) = match viewer_id {
            Some(id) => (
                self.reactions.exists(PostReaction::Like, id, post.id).await?,
                self.reactions.exists(PostReaction::Share, id, post.id).await?,
            ),
            None => (false, false),
        };

        Ok(PostDetail {
            author,
            category,
            media: self.posts.list_media(post.id).await?,
            tagged_users: self.posts.tagged_users(post.id).await?,
            likes_count: self.reactions.count(PostReaction::Like, post.id).await?,
            shares_count: self.reactions.count(PostReaction::Share, post.id).await?,
            is_liked,
            is_shared,
            comments: self.comments.list_by_post(post.id).await?,
            post,
        })
    }

    pub async fn create(&self, author: &User, input: PostInput) -> Result<Post, ContentError> {
        self.validate(&input).await?;
        let tagged = self.resolve_tagged(&input.tagged_users).await?;

        let now = Utc::now();
        let post = Post {
            id: 0,
            slug: self.unique_slug(&input.title).await?,
            title: input.title.trim().to_string(),
            author_id: author.id,
            category_id: input.category_id,
            content: input.content,
            featured: false,
            privacy: input.privacy,
            location: input.location.trim().to_string(),
            feeling: input.feeling,
            activity: input.activity.trim().to_string(),
            created_at: now,
            updated_at: now,
        };
        let post = self.posts.create(&post).await?;
        self.posts.set_tagged_users(post.id, &tagged).await?;

        tracing::info!("User {} created post {} ({})", author.id, post.id, post.slug);
        Ok(post)
    }

    /// Edit a post; the slug never changes
    pub async fn update(
        &self,
        post_id: i64,
        editor: &User,
        input: PostInput,
    ) -> Result<Post, ContentError> {
        let existing = self.owned(post_id, editor).await?;
        self.validate(&input).await?;
        let tagged = self.resolve_tagged(&input.tagged_users).await?;

        let post = Post {
            title: input.title.trim().to_string(),
            category_id: input.category_id,
            content: input.content,
            privacy: input.privacy,
            location: input.location.trim().to_string(),
            feeling: input.feeling,
            activity: input.activity.trim().to_string(),
            updated_at: Utc::now(),
            ..existing
        };
        self.posts.update(&post).await?;
        self.posts.set_tagged_users(post.id, &tagged).await?;
        Ok(post)
    }

    pub async fn delete(&self, post_id: i64, editor: &User) -> Result<(), ContentError> {
        let post = self.owned(post_id, editor).await?;
        let media = self.posts.list_media(post.id).await?;
        self.posts.delete(post.id).await?;

        for item in media {
            if let Err(e) = self.media.remove(&item.file).await {
                tracing::warn!("Failed to remove media {}: {}", item.file, e);
            }
        }
        tracing::info!("User {} deleted post {}", editor.id, post.id);
        Ok(())
    }

    /// Flip the featured flag, returning the new value
    pub async fn toggle_featured(&self, post_id: i64, editor: &User) -> Result<bool, ContentError> {
        let post = self.owned(post_id, editor).await?;
        let featured = !post.featured;
        self.posts.set_featured(post.id, featured).await?;
        Ok(featured)
    }

    /// Attach uploaded images or videos to a post
    pub async fn add_media(
        &self,
        post_id: i64,
        editor: &User,
        files: &[UploadedFile],
    ) -> Result<Vec<PostMedia>, ContentError> {
        let post = self.owned(post_id, editor).await?;
        if files.is_empty() {
            return Err(ContentError::validation("No file provided"));
        }

        let mut added = Vec::with_capacity(files.len());
        for file in files {
            let stored = self.media.save(POST_MEDIA_DIR, file, true).await?;
            let media_type = match stored.kind {
                MediaKind::Image => MediaType::Image,
                MediaKind::Video => MediaType::Video,
            };
            added.push(self.posts.add_media(post.id, &stored.path, media_type).await?);
        }
        Ok(added)
    }

    pub async fn toggle_like(&self, post_id: i64, user: &User) -> Result<ReactionOutcome, ContentError> {
        self.toggle_reaction(PostReaction::Like, post_id, user).await
    }

    pub async fn toggle_share(&self, post_id: i64, user: &User) -> Result<ReactionOutcome, ContentError> {
        self.toggle_reaction(PostReaction::Share, post_id, user).await
    }

    /// Likes received on every post of `author`
    pub async fn total_likes(&self, author: &User) -> Result<i64, ContentError> {
        Ok(self.reactions.total_likes_for_author(author.id).await?)
    }

    async fn toggle_reaction(
        &self,
        kind: PostReaction,
        post_id: i64,
        user: &User,
    ) -> Result<ReactionOutcome, ContentError> {
        let post = self.visible(post_id, user).await?;
        let active = self.reactions.toggle(kind, user.id, post.id).await?;

        if active {
            let notification_type = match kind {
                PostReaction::Like => NotificationType::Like,
                PostReaction::Share => NotificationType::Share,
            };
            self.notifier
                .notify(user.id, post.author_id, notification_type, Some(post.id), None)
                .await?;
        }

        Ok(ReactionOutcome {
            active,
            count: self.reactions.count(kind, post.id).await?,
        })
    }

    async fn visible(&self, post_id: i64, viewer: &User) -> Result<Post, ContentError> {
        match self.posts.get_by_id(post_id).await? {
            Some(post) if self.posts.is_visible(post.id, Some(viewer.id)).await? => Ok(post),
            _ => Err(ContentError::not_found("Post")),
        }
    }

    /// The post, if `editor` wrote it
    async fn owned(&self, post_id: i64, editor: &User) -> Result<Post, ContentError> {
        match self.posts.get_by_id(post_id).await? {
            Some(post) if post.author_id == editor.id => Ok(post),
            _ => Err(ContentError::not_found("Post")),
        }
    }

    async fn validate(&self, input: &PostInput) -> Result<(), ContentError> {
        require_text("Title", &input.title, MAX_TITLE_LEN)?;
        if input.content.trim().is_empty() {
            return Err(ContentError::validation("Content is required"));
        }
        limit_text("Location", &input.location, MAX_LOCATION_LEN)?;
        limit_text("Activity", &input.activity, MAX_ACTIVITY_LEN)?;

        if let Some(category_id) = input.category_id {
            if self.categories.get_by_id(category_id).await?.is_none() {
                return Err(ContentError::validation(format!(
                    "Category {} does not exist",
                    category_id
                )));
            }
        }
        Ok(())
    }

    async fn resolve_tagged(&self, usernames: &[String]) -> Result<Vec<i64>, ContentError> {
        let mut wanted: Vec<String> = usernames
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        wanted.sort();
        wanted.dedup();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.users.summaries_by_usernames(&wanted).await?;
        let missing: Vec<&str> = wanted
            .iter()
            .filter(|name| !found.iter().any(|u| &u.username == *name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ContentError::validation(format!(
                "Unknown users: {}",
                missing.join(", ")
            )));
        }
        Ok(found.into_iter().map(|u| u.id).collect())
    }

    /// Slug for `title`, suffixed with `-1`, `-2`, ... until unused
    async fn unique_slug(&self, title: &str) -> Result<String, ContentError> {
        let base = slugify(title);
        let mut candidate = base.clone();
        let mut n = 1;
        while self.posts.slug_exists(&candidate).await? {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        Ok(candidate)
    }
}
