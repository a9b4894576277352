//! Notification API endpoints
//!
//! - GET /api/v1/notifications - Every notification, then marks them read
//! - GET /api/v1/notifications/unread-count

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Notification;

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
}

/// GET /api/v1/notifications
///
/// Returned items show their read state from before this request.
async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state.services.social.notifications(&user.0).await?;
    Ok(Json(notifications))
}

async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread = state.services.social.unread_count(&user.0).await?;
    Ok(Json(UnreadCountResponse { unread }))
}
