//! Profile and follow API endpoints
//!
//! All routes require a session:
//! - GET /api/v1/profiles/{username} - Public page of a user
//! - PUT /api/v1/profile - Edit the bio
//! - POST /api/v1/profile/avatar - Upload an avatar (multipart field `avatar`)
//! - POST /api/v1/users/{id}/follow - Follow or unfollow
//! - GET /api/v1/users/{id}/followers

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::upload::read_file;
use crate::models::{Profile, UserSummary};
use crate::services::ProfileView;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub bio: String,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub status: &'static str,
    pub is_following: bool,
    pub followers_count: i64,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles/{username}", get(get_profile))
        .route("/profile", put(update_profile))
        .route("/profile/avatar", post(upload_avatar))
        .route("/users/{id}/follow", post(toggle_follow))
        .route("/users/{id}/followers", get(list_followers))
}

/// GET /api/v1/profiles/{username}
async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileView>, ApiError> {
    let view = state.services.social.profile(&username, &user.0).await?;
    Ok(Json(view))
}

/// PUT /api/v1/profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state.services.social.update_bio(&user.0, &body.bio).await?;
    Ok(Json(profile))
}

/// POST /api/v1/profile/avatar
async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    let file = read_file(&mut multipart, "avatar").await?;
    let avatar_url = state.services.social.update_avatar(&user.0, &file).await?;
    Ok(Json(AvatarResponse { avatar_url }))
}

/// POST /api/v1/users/{id}/follow
async fn toggle_follow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<FollowResponse>, ApiError> {
    let outcome = state.services.social.toggle_follow(&user.0, id).await?;
    Ok(Json(FollowResponse {
        status: "success",
        is_following: outcome.is_following,
        followers_count: outcome.followers_count,
    }))
}

/// GET /api/v1/users/{id}/followers
async fn list_followers(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let followers = state.services.social.followers(id).await?;
    Ok(Json(followers))
}
