//! Comment API endpoints
//!
//! - GET /api/v1/posts/{id}/comments - Comments on a visible post, oldest first
//! - POST /api/v1/posts/{id}/comments - Add a comment
//! - POST /api/v1/comments/{id}/like - Toggle a like
//! - DELETE /api/v1/comments/{id} - Delete (comment author or post author)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::Comment;
use crate::services::ContentError;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: String,
}

/// Reply to a new comment
#[derive(Debug, Serialize)]
pub struct CommentCreatedResponse {
    pub status: &'static str,
    pub id: i64,
    pub author: String,
    pub content: String,
    /// Formatted like `March 05, 2025 14:07`
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CommentLikeResponse {
    pub status: &'static str,
    pub likes_count: i64,
    pub is_liked: bool,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/posts/{post}/comments", get(list_comments))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts/{post}/comments", post(create_comment))
        .route("/comments/{id}/like", post(toggle_like))
        .route("/comments/{id}", delete(delete_comment))
}

/// GET /api/v1/posts/{id}/comments
async fn list_comments(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let comments = state
        .services
        .comments
        .list(post_id, viewer.user())
        .await?;
    Ok(Json(comments))
}

/// POST /api/v1/posts/{id}/comments
///
/// Empty content is answered with `{"status": "error"}` and 400.
async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(post_id): Path<i64>,
    Json(body): Json<CreateCommentRequest>,
) -> Result<Response, ApiError> {
    match state
        .services
        .comments
        .add(post_id, &user.0, &body.content)
        .await
    {
        Ok(comment) => Ok((
            StatusCode::CREATED,
            Json(CommentCreatedResponse {
                status: "success",
                id: comment.id,
                created_at: comment.display_time(),
                author: comment.author.username,
                content: comment.content,
            }),
        )
            .into_response()),
        Err(ContentError::Validation(message)) => Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "status": "error", "message": message })),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// POST /api/v1/comments/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<CommentLikeResponse>, ApiError> {
    let (is_liked, likes_count) = state.services.comments.toggle_like(id, &user.0).await?;
    Ok(Json(CommentLikeResponse {
        status: "success",
        likes_count,
        is_liked,
    }))
}

/// DELETE /api/v1/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.services.comments.delete(id, &user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}
