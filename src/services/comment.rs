//! Comment service
//!
//! Comments can be left on any post the author can see. A comment may be
//! removed by whoever wrote it or by the author of the post.

use crate::db::repositories::{CommentRepository, PostRepository, ReactionRepository};
use crate::models::{Comment, NotificationType, User};
use crate::services::error::ContentError;
use crate::services::social::Notifier;
use chrono::Utc;
use std::sync::Arc;

pub const EMPTY_COMMENT: &str = "Comment content cannot be empty.";

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
    reactions: Arc<dyn ReactionRepository>,
    notifier: Notifier,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        posts: Arc<dyn PostRepository>,
        reactions: Arc<dyn ReactionRepository>,
        notifier: Notifier,
    ) -> Self {
        Self {
            comments,
            posts,
            reactions,
            notifier,
        }
    }

    pub async fn add(&self, post_id: i64, author: &User, content: &str) -> Result<Comment, ContentError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ContentError::validation(EMPTY_COMMENT));
        }

        let post = match self.posts.get_by_id(post_id).await? {
            Some(post) if self.posts.is_visible(post.id, Some(author.id)).await? => post,
            _ => return Err(ContentError::not_found("Post")),
        };

        let id = self
            .comments
            .create(post.id, author.id, content, Utc::now())
            .await?;
        self.notifier
            .notify(author.id, post.author_id, NotificationType::Comment, Some(post.id), Some(id))
            .await?;

        self.comments
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::not_found("Comment"))
    }

    pub async fn list(&self, post_id: i64, viewer: Option<&User>) -> Result<Vec<Comment>, ContentError> {
        if !self.posts.is_visible(post_id, viewer.map(|u| u.id)).await? {
            return Err(ContentError::not_found("Post"));
        }
        Ok(self.comments.list_by_post(post_id).await?)
    }

    /// Like or unlike a comment, returning whether it is now liked and the count
    pub async fn toggle_like(&self, comment_id: i64, user: &User) -> Result<(bool, i64), ContentError> {
        let comment = self
            .comments
            .get_by_id(comment_id)
            .await?
            .ok_or_else(|| ContentError::not_found("Comment"))?;
        if !self.posts.is_visible(comment.post_id, Some(user.id)).await? {
            return Err(ContentError::not_found("Comment"));
        }

        let liked = self.reactions.toggle_comment_like(user.id, comment.id).await?;
        Ok((liked, self.reactions.comment_likes(comment.id).await?))
    }

    pub async fn delete(&self, comment_id: i64, user: &User) -> Result<(), ContentError> {
        let comment = self
            .comments
            .get_by_id(comment_id)
            .await?
            .ok_or_else(|| ContentError::not_found("Comment"))?;

        let post_author = self
            .posts
            .get_by_id(comment.post_id)
            .await?
            .map(|p| p.author_id);
        if comment.author.id != user.id && post_author != Some(user.id) {
            return Err(ContentError::Forbidden(
                "You don't have permission to delete this comment.".to_string(),
            ));
        }

        self.comments.delete(comment.id).await?;
        Ok(())
    }

    /// Latest comments written by `user`
    pub async fn recent_by(&self, user: &User, limit: i64) -> Result<Vec<Comment>, ContentError> {
        Ok(self.comments.recent_by_author(user.id, limit).await?)
    }

    /// Comments left on posts written by `user`
    pub async fn received_count(&self, user: &User) -> Result<i64, ContentError> {
        Ok(self.comments.count_on_author_posts(user.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_post, insert_user, setup_pool};
    use crate::db::repositories::{
        SqlxCommentRepository, SqlxNotificationRepository, SqlxPostRepository,
        SqlxReactionRepository, SqlxUserRepository, UserRepository,
    };
    use crate::models::Privacy;
    use sqlx::SqlitePool;

    async fn fixture() -> (SqlitePool, CommentService, Arc<dyn UserRepository>) {
        let pool = setup_pool().await;
        let service = CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            SqlxReactionRepository::boxed(pool.clone()),
            Notifier::new(SqlxNotificationRepository::boxed(pool.clone())),
        );
        let users = SqlxUserRepository::boxed(pool.clone());
        (pool, service, users)
    }

    async fn user(pool: &SqlitePool, users: &Arc<dyn UserRepository>, name: &str) -> User {
        let id = insert_user(pool, name).await;
        users.get_by_id(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_add_comment_notifies_post_author() {
        let (pool, service, users) = fixture().await;
        let alice = user(&pool, &users, "alice").await;
        let bob = user(&pool, &users, "bob").await;
        let post = insert_post(&pool, alice.id, "Hello", Privacy::Public).await;

        let comment = service.add(post, &bob, "  Nice post  ").await.unwrap();
        assert_eq!(comment.content, "Nice post");
        assert_eq!(comment.author.username, "bob");

        service.add(post, &alice, "Thanks").await.unwrap();
        let notified: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE notification_type = 'comment'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(notified, 1);

        let listed = service.list(post, None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "Nice post");
        assert_eq!(service.received_count(&alice).await.unwrap(), 2);
        assert_eq!(service.recent_by(&bob, 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_comment_rejections() {
        let (pool, service, users) = fixture().await;
        let alice = user(&pool, &users, "alice").await;
        let bob = user(&pool, &users, "bob").await;
        let private = insert_post(&pool, alice.id, "Secret", Privacy::Private).await;

        let err = service.add(private, &alice, "   ").await.unwrap_err();
        assert_eq!(err.to_string(), EMPTY_COMMENT);
        assert!(matches!(
            service.add(private, &bob, "Hi").await,
            Err(ContentError::NotFound(_))
        ));
        assert!(matches!(
            service.add(999, &bob, "Hi").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let (pool, service, users) = fixture().await;
        let alice = user(&pool, &users, "alice").await;
        let bob = user(&pool, &users, "bob").await;
        let carol = user(&pool, &users, "carol").await;
        let post = insert_post(&pool, alice.id, "Hello", Privacy::Public).await;

        let by_bob = service.add(post, &bob, "First").await.unwrap();
        let again = service.add(post, &bob, "Second").await.unwrap();

        assert!(matches!(
            service.delete(by_bob.id, &carol).await,
            Err(ContentError::Forbidden(_))
        ));
        service.delete(by_bob.id, &bob).await.unwrap();
        service.delete(again.id, &alice).await.unwrap();
        assert!(service.list(post, None).await.unwrap().is_empty());
        assert!(service.delete(again.id, &alice).await.is_err());
    }

    #[tokio::test]
    async fn test_comment_like_toggle() {
        let (pool, service, users) = fixture().await;
        let alice = user(&pool, &users, "alice").await;
        let post = insert_post(&pool, alice.id, "Hello", Privacy::Public).await;
        let comment = service.add(post, &alice, "Mine").await.unwrap();

        assert_eq!(service.toggle_like(comment.id, &alice).await.unwrap(), (true, 1));
        assert_eq!(service.toggle_like(comment.id, &alice).await.unwrap(), (false, 0));
        assert!(service.toggle_like(404, &alice).await.is_err());
    }
}
