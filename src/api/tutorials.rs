//! Tutorial API endpoints
//!
//! - GET /api/v1/tutorials - Anonymous visitors get featured tutorials only
//! - GET /api/v1/tutorials/{id}
//! - POST /api/v1/tutorials (signed in)
//! - PUT/DELETE /api/v1/tutorials/{id} (author only, 404 otherwise)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::PageQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::{PagedResult, Tutorial, TutorialInput};
use crate::services::TUTORIALS_PER_PAGE;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/tutorials", get(list_tutorials))
        .route("/tutorials/{id}", get(get_tutorial))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/tutorials", post(create_tutorial))
        .route(
            "/tutorials/{id}",
            axum::routing::put(update_tutorial).delete(delete_tutorial),
        )
}

async fn list_tutorials(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<Tutorial>>, ApiError> {
    let page = state
        .services
        .tutorials
        .list(viewer.user(), query.params(TUTORIALS_PER_PAGE))
        .await?;
    Ok(Json(page))
}

async fn get_tutorial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Tutorial>, ApiError> {
    Ok(Json(state.services.tutorials.get(id).await?))
}

async fn create_tutorial(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<TutorialInput>,
) -> Result<impl IntoResponse, ApiError> {
    let tutorial = state.services.tutorials.create(&user.0, input).await?;
    Ok((StatusCode::CREATED, Json(tutorial)))
}

async fn update_tutorial(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<TutorialInput>,
) -> Result<Json<Tutorial>, ApiError> {
    Ok(Json(state.services.tutorials.update(id, &user.0, input).await?))
}

async fn delete_tutorial(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.services.tutorials.delete(id, &user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}
