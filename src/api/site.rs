//! Site-wide API endpoints
//!
//! Public:
//! - GET /api/v1/site/info - Site name and login settings
//! - GET /api/v1/site/home - Home page aggregate
//! - GET /api/v1/categories
//! - POST /api/v1/contact - Contact form
//! - POST /api/v1/newsletter - Newsletter subscription
//!
//! Signed in:
//! - GET /api/v1/dashboard - Personal dashboard

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::StatusMessage;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::{Category, ContactInput};
use crate::services::contact::CONTACT_THANKS;
use crate::services::{Dashboard, HomePage};

/// Response for public site info
#[derive(Debug, Serialize)]
pub struct SiteInfoResponse {
    pub version: String,
    pub site_name: String,
    pub two_factor_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewsletterRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct NewsletterResponse {
    pub subscribed: bool,
    pub message: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/site/info", get(get_site_info))
        .route("/site/home", get(get_home))
        .route("/categories", get(list_categories))
        .route("/contact", post(submit_contact))
        .route("/newsletter", post(subscribe))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}

/// GET /api/v1/site/info
async fn get_site_info(State(state): State<AppState>) -> Json<SiteInfoResponse> {
    Json(SiteInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        site_name: state.config.email.site_name.clone(),
        two_factor_enabled: state.config.security.two_factor_enabled,
    })
}

/// GET /api/v1/site/home
async fn get_home(
    State(state): State<AppState>,
    viewer: OptionalUser,
) -> Result<Json<HomePage>, ApiError> {
    let home = state.services.site.home(viewer.user()).await?;
    Ok(Json(home))
}

/// GET /api/v1/dashboard
async fn get_dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Dashboard>, ApiError> {
    let dashboard = state.services.site.dashboard(&user.0).await?;
    Ok(Json(dashboard))
}

/// GET /api/v1/categories
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = state.services.categories.list().await?;
    Ok(Json(categories))
}

/// POST /api/v1/contact
async fn submit_contact(
    State(state): State<AppState>,
    Json(input): Json<ContactInput>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.contact.submit(input).await?;
    Ok((StatusCode::CREATED, Json(StatusMessage::success(CONTACT_THANKS))))
}

/// POST /api/v1/newsletter
///
/// Subscribing an address twice is not an error.
async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<NewsletterRequest>,
) -> Result<Json<NewsletterResponse>, ApiError> {
    let (subscribed, message) = state.services.contact.subscribe(&body.email).await?;
    Ok(Json(NewsletterResponse {
        subscribed,
        message: message.to_string(),
    }))
}
