//! Post repository
//!
//! Listing queries take the viewer into account: a post is visible when it
//! is public, when the viewer wrote it, or when it is friends-only and the
//! viewer and the author follow each other.

use crate::models::{Feeling, ListParams, MediaType, Post, PostMedia, PostSummary, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::user::row_to_summary;

const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.author_id, p.category_id, p.content, \
     p.featured, p.privacy, p.location, p.feeling, p.activity, p.created_at, p.updated_at";

/// Listing filters, all optional
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Case-insensitive substring of the title or the content
    pub query: Option<String>,
    /// Exact category name
    pub category: Option<String>,
    pub author_id: Option<i64>,
    pub featured_only: bool,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    /// Persist every editable column of an existing post
    async fn update(&self, post: &Post) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    async fn set_featured(&self, id: i64, featured: bool) -> Result<()>;

    /// Whether `viewer_id` (None for anonymous) may read the post
    async fn is_visible(&self, post_id: i64, viewer_id: Option<i64>) -> Result<bool>;

    async fn count_visible(&self, filter: &PostFilter, viewer_id: Option<i64>) -> Result<i64>;

    /// Visible posts, newest first; `None` params returns every match
    async fn list_visible(
        &self,
        filter: &PostFilter,
        viewer_id: Option<i64>,
        params: Option<&ListParams>,
    ) -> Result<Vec<PostSummary>>;

    /// Replace the tagged users of a post
    async fn set_tagged_users(&self, post_id: i64, user_ids: &[i64]) -> Result<()>;

    async fn tagged_users(&self, post_id: i64) -> Result<Vec<UserSummary>>;

    async fn add_media(&self, post_id: i64, file: &str, media_type: MediaType)
        -> Result<PostMedia>;

    /// Media of a post, oldest first
    async fn list_media(&self, post_id: i64) -> Result<Vec<PostMedia>>;
}

pub struct SqlxPostRepository {
    pool: SqlitePool,
}

impl SqlxPostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_post(&self, clause: &str, bind: PostKey<'_>) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE {}", POST_COLUMNS, clause);
        let query = sqlx::query(&sql);
        let query = match bind {
            PostKey::Id(id) => query.bind(id),
            PostKey::Slug(slug) => query.bind(slug),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post")?;
        row.map(|r| row_to_post(&r)).transpose()
    }
}

enum PostKey<'a> {
    Id(i64),
    Slug(&'a str),
}

/// Append the visibility predicate for `viewer`
fn push_visibility(qb: &mut QueryBuilder<'_, Sqlite>, viewer: i64) {
    qb.push("(p.privacy = 'public' OR p.author_id = ");
    qb.push_bind(viewer);
    qb.push(
        " OR (p.privacy = 'friends' \
         AND EXISTS (SELECT 1 FROM follows f1 WHERE f1.followee_id = p.author_id AND f1.follower_id = ",
    );
    qb.push_bind(viewer);
    qb.push(") AND EXISTS (SELECT 1 FROM follows f2 WHERE f2.follower_id = p.author_id AND f2.followee_id = ");
    qb.push_bind(viewer);
    qb.push(")))");
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", escape_like(query));
        qb.push(" AND (p.title LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR p.content LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
    if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND c.name = ");
        qb.push_bind(category.to_string());
    }
    if let Some(author_id) = filter.author_id {
        qb.push(" AND p.author_id = ");
        qb.push_bind(author_id);
    }
    if filter.featured_only {
        qb.push(" AND p.featured = 1");
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (title, slug, author_id, category_id, content, featured, privacy,
                               location, feeling, activity, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(post.author_id)
        .bind(post.category_id)
        .bind(&post.content)
        .bind(post.featured)
        .bind(post.privacy.to_string())
        .bind(&post.location)
        .bind(post.feeling.map(|f| f.as_str()).unwrap_or(""))
        .bind(&post.activity)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to create post")?;

        Ok(Post {
            id: result.last_insert_rowid(),
            ..post.clone()
        })
    }

    async fn update(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, category_id = ?, content = ?, featured = ?, privacy = ?,
                location = ?, feeling = ?, activity = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(post.category_id)
        .bind(&post.content)
        .bind(post.featured)
        .bind(post.privacy.to_string())
        .bind(&post.location)
        .bind(post.feeling.map(|f| f.as_str()).unwrap_or(""))
        .bind(&post.activity)
        .bind(post.updated_at)
        .bind(post.id)
        .execute(&self.pool)
        .await
        .context("Failed to update post")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete post")?;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        self.fetch_post("p.id = ?", PostKey::Id(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        self.fetch_post("p.slug = ?", PostKey::Slug(slug)).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM posts WHERE slug = ?) AS found")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check slug")?;
        Ok(row.get("found"))
    }

    async fn set_featured(&self, id: i64, featured: bool) -> Result<()> {
        sqlx::query("UPDATE posts SET featured = ?, updated_at = ? WHERE id = ?")
            .bind(featured)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to toggle featured")?;
        Ok(())
    }

    async fn is_visible(&self, post_id: i64, viewer_id: Option<i64>) -> Result<bool> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT EXISTS(SELECT 1 FROM posts p WHERE p.id = ");
        qb.push_bind(post_id);
        qb.push(" AND ");
        push_visibility(&mut qb, viewer_id.unwrap_or(0));
        qb.push(") AS found");

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to check post visibility")?;
        Ok(row.get("found"))
    }

    async fn count_visible(&self, filter: &PostFilter, viewer_id: Option<i64>) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS count FROM posts p LEFT JOIN categories c ON c.id = p.category_id WHERE ",
        );
        push_visibility(&mut qb, viewer_id.unwrap_or(0));
        push_filter(&mut qb, filter);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count posts")?;
        Ok(row.get("count"))
    }

    async fn list_visible(
        &self,
        filter: &PostFilter,
        viewer_id: Option<i64>,
        params: Option<&ListParams>,
    ) -> Result<Vec<PostSummary>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            r#"
            SELECT {},
                   u.username AS author_username, u.email AS author_email,
                   pr.avatar AS author_avatar, c.name AS category_name,
                   (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes_count,
                   (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comments_count
            FROM posts p
            JOIN users u ON u.id = p.author_id
            LEFT JOIN profiles pr ON pr.user_id = u.id
            LEFT JOIN categories c ON c.id = p.category_id
            WHERE "#,
            POST_COLUMNS
        ));
        push_visibility(&mut qb, viewer_id.unwrap_or(0));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC");
        if let Some(params) = params {
            qb.push(" LIMIT ");
            qb.push_bind(params.limit());
            qb.push(" OFFSET ");
            qb.push_bind(params.offset());
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list posts")?;

        rows.iter()
            .map(|row| {
                Ok(PostSummary {
                    post: row_to_post(row)?,
                    author: row_to_summary(row, "author_"),
                    category: row.get("category_name"),
                    likes_count: row.get("likes_count"),
                    comments_count: row.get("comments_count"),
                })
            })
            .collect()
    }

    async fn set_tagged_users(&self, post_id: i64, user_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM post_tagged_users WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear tagged users")?;

        for user_id in user_ids {
            sqlx::query("INSERT OR IGNORE INTO post_tagged_users (post_id, user_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .context("Failed to tag user")?;
        }

        tx.commit().await.context("Failed to commit tagged users")?;
        Ok(())
    }

    async fn tagged_users(&self, post_id: i64) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email, pr.avatar
            FROM post_tagged_users t
            JOIN users u ON u.id = t.user_id
            LEFT JOIN profiles pr ON pr.user_id = u.id
            WHERE t.post_id = ?
            ORDER BY u.username
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tagged users")?;

        Ok(rows.iter().map(|r| row_to_summary(r, "")).collect())
    }

    async fn add_media(
        &self,
        post_id: i64,
        file: &str,
        media_type: MediaType,
    ) -> Result<PostMedia> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO post_media (post_id, file, media_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(file)
        .bind(media_type.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to add post media")?;

        Ok(PostMedia {
            id: result.last_insert_rowid(),
            post_id,
            file: file.to_string(),
            media_type,
            created_at: now,
        })
    }

    async fn list_media(&self, post_id: i64) -> Result<Vec<PostMedia>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, file, media_type, created_at
            FROM post_media
            WHERE post_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list post media")?;

        rows.iter()
            .map(|row| {
                let media_type: String = row.get("media_type");
                Ok(PostMedia {
                    id: row.get("id"),
                    post_id: row.get("post_id"),
                    file: row.get("file"),
                    media_type: media_type.parse()?,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let privacy: String = row.get("privacy");
    let feeling: String = row.get("feeling");
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        content: row.get("content"),
        featured: row.get("featured"),
        privacy: privacy.parse()?,
        location: row.get("location"),
        feeling: Feeling::from_column(&feeling),
        activity: row.get("activity"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{follow, insert_post, insert_user, setup_pool};
    use crate::models::Privacy;

    #[tokio::test]
    async fn test_create_and_fetch() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "alice").await;
        let repo = SqlxPostRepository::new(pool);

        let now = Utc::now();
        let post = repo
            .create(&Post {
                id: 0,
                title: "Hello".into(),
                slug: "hello".into(),
                author_id: author,
                category_id: None,
                content: "World".into(),
                featured: false,
                privacy: Privacy::Friends,
                location: "Oslo".into(),
                feeling: Some(Feeling::Happy),
                activity: String::new(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let by_slug = repo.get_by_slug("hello").await.unwrap().unwrap();
        assert_eq!(by_slug.id, post.id);
        assert_eq!(by_slug.privacy, Privacy::Friends);
        assert_eq!(by_slug.feeling, Some(Feeling::Happy));
        assert!(repo.slug_exists("hello").await.unwrap());
        assert!(!repo.slug_exists("nope").await.unwrap());

        repo.set_featured(post.id, true).await.unwrap();
        assert!(repo.get_by_id(post.id).await.unwrap().unwrap().featured);

        repo.delete(post.id).await.unwrap();
        assert!(repo.get_by_id(post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_visibility_rules() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "author").await;
        let friend = insert_user(&pool, "friend").await;
        let fan = insert_user(&pool, "fan").await;
        let public = insert_post(&pool, author, "Public", Privacy::Public).await;
        let friends = insert_post(&pool, author, "Friends", Privacy::Friends).await;
        let private = insert_post(&pool, author, "Private", Privacy::Private).await;

        follow(&pool, author, friend).await;
        follow(&pool, friend, author).await;
        // one-way follow is not friendship
        follow(&pool, fan, author).await;

        let repo = SqlxPostRepository::new(pool);
        for (viewer, expected) in [
            (None, [true, false, false]),
            (Some(author), [true, true, true]),
            (Some(friend), [true, true, false]),
            (Some(fan), [true, false, false]),
        ] {
            let seen = [
                repo.is_visible(public, viewer).await.unwrap(),
                repo.is_visible(friends, viewer).await.unwrap(),
                repo.is_visible(private, viewer).await.unwrap(),
            ];
            assert_eq!(seen, expected, "viewer {:?}", viewer);
        }

        let filter = PostFilter::default();
        assert_eq!(repo.count_visible(&filter, None).await.unwrap(), 1);
        assert_eq!(repo.count_visible(&filter, Some(friend)).await.unwrap(), 2);
        assert_eq!(repo.count_visible(&filter, Some(author)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_list_filters_and_order() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "alice").await;
        let first = insert_post(&pool, author, "Rust tips", Privacy::Public).await;
        let second = insert_post(&pool, author, "Gardening", Privacy::Public).await;
        let third = insert_post(&pool, author, "100% rust", Privacy::Public).await;

        let repo = SqlxPostRepository::new(pool);

        let all = repo.list_visible(&PostFilter::default(), None, None).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|p| p.post.id).collect();
        assert_eq!(ids, vec![third, second, first]);
        assert_eq!(all[0].author.username, "alice");

        let filter = PostFilter {
            query: Some("RUST".into()),
            ..Default::default()
        };
        let found = repo.list_visible(&filter, None, None).await.unwrap();
        assert_eq!(found.len(), 2);

        let filter = PostFilter {
            query: Some("100%".into()),
            ..Default::default()
        };
        let found = repo.list_visible(&filter, None, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].post.id, third);

        let params = ListParams::new(2, 2);
        let page = repo
            .list_visible(&PostFilter::default(), None, Some(&params))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].post.id, first);
    }

    #[tokio::test]
    async fn test_tagged_users_and_media() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let carol = insert_user(&pool, "carol").await;
        let post = insert_post(&pool, author, "Trip", Privacy::Public).await;
        let repo = SqlxPostRepository::new(pool);

        repo.set_tagged_users(post, &[bob, carol]).await.unwrap();
        repo.set_tagged_users(post, &[carol]).await.unwrap();
        let tagged = repo.tagged_users(post).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].username, "carol");

        repo.add_media(post, "post_media/a.png", MediaType::Image).await.unwrap();
        repo.add_media(post, "post_media/b.mp4", MediaType::Video).await.unwrap();
        let media = repo.list_media(post).await.unwrap();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].media_type, MediaType::Image);
        assert_eq!(media[1].url(), "/media/post_media/b.mp4");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
