//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an account and sign in
//! - POST /api/v1/auth/login - Check a password; may ask for an emailed code
//! - POST /api/v1/auth/verify-2fa - Exchange challenge and code for a session
//! - POST /api/v1/auth/resend-code - Email a fresh code for a pending login
//! - POST /api/v1/auth/logout - End the session
//! - GET /api/v1/auth/me - Current user

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::{ClientInfo, Session, User};
use crate::services::user::{LoginInput, LoginOutcome, RegisterInput, ResendOutcome};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Defaults to `password` when omitted
    #[serde(default)]
    pub password_confirm: Option<String>,
}

/// Request body for user login; `username` may be an email address
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub challenge: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub challenge: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_staff: user.is_staff,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Reply to a login while a code is pending
#[derive(Debug, Serialize)]
pub struct TwoFactorResponse {
    pub two_factor_required: bool,
    pub challenge: String,
    pub masked_email: String,
    pub message: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-2fa", post(verify_two_factor))
        .route("/resend-code", post(resend_code))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

fn session_cookie(state: &AppState, session: &Session) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        state.session_max_age()
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::internal_error(format!("Invalid session cookie: {}", e)))?,
    );
    Ok(headers)
}

fn signed_in(
    state: &AppState,
    status: StatusCode,
    user: User,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let headers = session_cookie(state, &session)?;
    Ok((
        status,
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/register - User registration
///
/// The first account becomes staff.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut input = RegisterInput::new(body.username, body.email, body.password);
    if let Some(confirm) = body.password_confirm {
        input.password_confirm = confirm;
    }

    let (user, session) = state.services.users.register(input).await?;
    signed_in(&state, StatusCode::CREATED, user, session)
}

/// POST /api/v1/auth/login - User login
///
/// With two-factor login on, a correct password returns a challenge and
/// emails a code instead of opening a session.
async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<LoginRequest>,
) -> Result<axum::response::Response, ApiError> {
    let input = LoginInput::new(body.username, body.password);

    match state.services.users.login(input, &client).await? {
        LoginOutcome::Authenticated { user, session } => {
            Ok(signed_in(&state, StatusCode::OK, user, session)?.into_response())
        }
        LoginOutcome::TwoFactorRequired {
            challenge,
            masked_email,
            message,
        } => Ok(Json(TwoFactorResponse {
            two_factor_required: true,
            challenge,
            masked_email,
            message,
        })
        .into_response()),
    }
}

/// POST /api/v1/auth/verify-2fa - Finish a pending login
async fn verify_two_factor(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state
        .services
        .users
        .verify_two_factor(&body.challenge, &body.code, &client)
        .await?;
    signed_in(&state, StatusCode::OK, user, session)
}

/// POST /api/v1/auth/resend-code - Send another code
///
/// Failures other than internal errors come back as `success: false`.
async fn resend_code(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<ResendRequest>,
) -> Result<Json<ResendOutcome>, ApiError> {
    let outcome = state
        .services
        .users
        .resend_code(&body.challenge, &client)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/auth/logout - User logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.services.users.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me - Get current user
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}
