//! Post API endpoints
//!
//! Public (anonymous visitors see public posts only):
//! - GET /api/v1/posts - Paginated listing with `q`, `category` and `page`
//! - GET /api/v1/posts/search - Every post matching `q`
//! - GET /api/v1/posts/{slug} - Single post with media, reactions and comments
//!
//! Signed in:
//! - POST /api/v1/posts - Create
//! - PUT/DELETE /api/v1/posts/{id} - Edit or delete (author only)
//! - POST /api/v1/posts/{id}/featured - Toggle the featured flag (author only)
//! - POST /api/v1/posts/{id}/media - Attach images or videos (author only)
//! - POST /api/v1/posts/{id}/like and /share - Toggle a reaction
//!
//! The `{post}` segment is the slug on reads and the numeric id on writes.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::common::PageQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::api::upload::read_files;
use crate::db::repositories::PostFilter;
use crate::models::{PagedResult, Post, PostDetail, PostInput, PostMedia, PostSummary};
use crate::services::POSTS_PER_PAGE;

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub status: &'static str,
    pub likes_count: i64,
    pub is_liked: bool,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub status: &'static str,
    pub shares_count: i64,
    pub is_shared: bool,
}

#[derive(Debug, Serialize)]
pub struct FeaturedResponse {
    pub featured: bool,
}

#[derive(Debug, Serialize)]
pub struct MediaResponse {
    pub url: String,
    #[serde(flatten)]
    pub media: PostMedia,
}

/// Build public post routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/search", get(search_posts))
        .route("/posts/{post}", get(get_post))
}

/// Build protected post routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route(
            "/posts/{post}",
            axum::routing::put(update_post).delete(delete_post),
        )
        .route("/posts/{post}/featured", post(toggle_featured))
        .route("/posts/{post}/media", post(upload_media))
        .route("/posts/{post}/like", post(toggle_like))
        .route("/posts/{post}/share", post(toggle_share))
}

/// GET /api/v1/posts - Blog listing
async fn list_posts(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<PostSummary>>, ApiError> {
    let filter = PostFilter {
        query: query.query(),
        category: query.category(),
        ..Default::default()
    };
    let page = state
        .services
        .posts
        .list(&filter, viewer.user(), query.params(POSTS_PER_PAGE))
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/posts/search?q= - Search without pagination
async fn search_posts(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<PostSummary>>, ApiError> {
    let q = query.q.unwrap_or_default();
    let posts = state.services.posts.search(&q, viewer.user()).await?;
    Ok(Json(posts))
}

/// GET /api/v1/posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(slug): Path<String>,
) -> Result<Json<PostDetail>, ApiError> {
    let detail = state.services.posts.detail(&slug, viewer.user()).await?;
    Ok(Json(detail))
}

/// POST /api/v1/posts
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<PostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.services.posts.create(&user.0, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /api/v1/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<PostInput>,
) -> Result<Json<Post>, ApiError> {
    let post = state.services.posts.update(id, &user.0, input).await?;
    Ok(Json(post))
}

/// DELETE /api/v1/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.services.posts.delete(id, &user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/posts/{id}/featured
async fn toggle_featured(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<FeaturedResponse>, ApiError> {
    let featured = state.services.posts.toggle_featured(id, &user.0).await?;
    Ok(Json(FeaturedResponse { featured }))
}

/// POST /api/v1/posts/{id}/media
///
/// Accepts multipart/form-data with one or more fields named `files` or `file`.
async fn upload_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let files = read_files(&mut multipart, &["files", "file"]).await?;
    let added = state.services.posts.add_media(id, &user.0, &files).await?;

    let media: Vec<MediaResponse> = added
        .into_iter()
        .map(|media| MediaResponse {
            url: media.url(),
            media,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(media)))
}

/// POST /api/v1/posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeResponse>, ApiError> {
    let outcome = state.services.posts.toggle_like(id, &user.0).await?;
    Ok(Json(LikeResponse {
        status: "success",
        likes_count: outcome.count,
        is_liked: outcome.active,
    }))
}

/// POST /api/v1/posts/{id}/share
async fn toggle_share(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ShareResponse>, ApiError> {
    let outcome = state.services.posts.toggle_share(id, &user.0).await?;
    Ok(Json(ShareResponse {
        status: "success",
        shares_count: outcome.count,
        is_shared: outcome.active,
    }))
}
