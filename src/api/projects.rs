//! Project showcase API endpoints
//!
//! - GET /api/v1/projects - Anonymous visitors get featured projects only
//! - GET /api/v1/projects/{id}
//! - POST /api/v1/projects (signed in)
//! - PUT/DELETE /api/v1/projects/{id} (author only, 403 otherwise)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::PageQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::{PagedResult, Project, ProjectInput};
use crate::services::PROJECTS_PER_PAGE;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/{id}", get(get_project))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route(
            "/projects/{id}",
            axum::routing::put(update_project).delete(delete_project),
        )
}

async fn list_projects(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<Project>>, ApiError> {
    let page = state
        .services
        .projects
        .list(viewer.user(), query.params(PROJECTS_PER_PAGE))
        .await?;
    Ok(Json(page))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.services.projects.get(id).await?))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<ProjectInput>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.services.projects.create(&user.0, input).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ProjectInput>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.services.projects.update(id, &user.0, input).await?))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.services.projects.delete(id, &user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}
