//! Staff API endpoints
//!
//! Every route requires a staff session:
//! - GET /api/v1/admin/security - Login and code statistics for the last 24h
//! - POST /api/v1/admin/categories - Create a category
//! - DELETE /api/v1/admin/categories/{id}
//! - GET /api/v1/admin/messages - Contact form messages
//! - POST /api/v1/admin/messages/{id}/responded
//! - GET /api/v1/admin/subscribers - Newsletter subscribers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{ContactMessage, NewsletterSubscriber, SecurityOverview};
use crate::services::ContentError;

/// Request for creating a category
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/security", get(security_overview))
        .route("/categories", post(create_category))
        .route("/categories/{id}", delete(delete_category))
        .route("/messages", get(list_messages))
        .route("/messages/{id}/responded", post(mark_responded))
        .route("/subscribers", get(list_subscribers))
}

/// GET /api/v1/admin/security
async fn security_overview(
    State(state): State<AppState>,
) -> Result<Json<SecurityOverview>, ApiError> {
    let overview = state
        .services
        .two_factor
        .security_overview()
        .await
        .map_err(ContentError::from)?;
    Ok(Json(overview))
}

/// POST /api/v1/admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .services
        .categories
        .create(&body.name, &body.icon)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// DELETE /api/v1/admin/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.services.categories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/messages
async fn list_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContactMessage>>, ApiError> {
    Ok(Json(state.services.contact.messages().await?))
}

/// POST /api/v1/admin/messages/{id}/responded
async fn mark_responded(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.services.contact.mark_responded(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/subscribers
async fn list_subscribers(
    State(state): State<AppState>,
) -> Result<Json<Vec<NewsletterSubscriber>>, ApiError> {
    Ok(Json(state.services.contact.subscribers().await?))
}
