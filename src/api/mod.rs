//! API layer - HTTP handlers and routing
//!
//! JSON endpoints live under `/api/v1`, uploaded files are served from
//! `/media`. It includes:
//! - Auth endpoints (registration, password and email code login)
//! - Post, comment and reaction endpoints
//! - Profile, follow and notification endpoints
//! - Project and tutorial showcase endpoints
//! - Home page, dashboard, contact and newsletter endpoints
//! - Staff endpoints

pub mod admin;
pub mod auth;
pub mod comments;
pub mod common;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod projects;
pub mod site;
pub mod tutorials;
pub mod upload;


use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Staff routes
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_staff))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need a session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(posts::protected_router())
        .merge(comments::protected_router())
        .merge(profiles::router())
        .merge(notifications::router())
        .merge(projects::protected_router())
        .merge(tutorials::protected_router())
        .merge(site::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; a valid session still identifies the viewer
    Router::new()
        .nest("/auth", auth::public_router())
        .merge(posts::public_router())
        .merge(comments::public_router())
        .merge(projects::public_router())
        .merge(tutorials::public_router())
        .merge(site::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin = state
        .config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", state.config.server.cors_origin))?;

    // Credentials are allowed so the session cookie travels cross-origin
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let media = ServeDir::new(&state.config.upload.path);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service("/media", media)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
