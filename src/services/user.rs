//! User service
//!
//! Registration, password login with the optional email code step,
//! sessions and logout.
//!
//! With two-factor login enabled a correct password does not open a
//! session. It creates a pending-login challenge (an opaque token mapped to
//! the user id in the cache for as long as a code is valid) and emails a
//! code; `verify_two_factor` exchanges challenge and code for a session.

use crate::cache::{CacheLayer, MemoryCache};
use crate::config::SecurityConfig;
use crate::db::repositories::{ProfileRepository, SessionRepository, UserRepository};
use crate::models::{ClientInfo, NewLoginAttempt, Session, User};
use crate::services::password::{hash_password, verify_password};
use crate::services::two_factor::{TwoFactorError, TwoFactorService};
use anyhow::Context;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

pub const INVALID_CREDENTIALS: &str = "Invalid username or password.";
pub const INVALID_CODE_FORMAT: &str = "Please enter a valid 6-digit code.";
pub const NO_PENDING_LOGIN: &str = "No pending login found. Please log in again.";
pub const PENDING_USER_MISSING: &str = "User not found. Please log in again.";

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("valid regex"));

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Wrong credentials or a missing pending login
    #[error("{0}")]
    AuthenticationError(String),

    #[error("{0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("{0}")]
    UserExists(String),

    #[error(transparent)]
    TwoFactor(#[from] TwoFactorError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            email: email.into(),
            password_confirm: password.clone(),
            password,
        }
    }
}

/// Input for user login; `username` may also be an email address
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// What a correct password leads to
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Signed in directly
    Authenticated { user: User, session: Session },
    /// A code was emailed; finish with the challenge
    TwoFactorRequired {
        challenge: String,
        masked_email: String,
        message: String,
    },
}

/// Reply to a resend request
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResendOutcome {
    pub success: bool,
    pub message: String,
}

impl ResendOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}

fn challenge_key(challenge: &str) -> String {
    format!("2fa_pending:{}", challenge)
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    profile_repo: Arc<dyn ProfileRepository>,
    two_factor: Arc<TwoFactorService>,
    cache: Arc<MemoryCache>,
    security: SecurityConfig,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        two_factor: Arc<TwoFactorService>,
        cache: Arc<MemoryCache>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            profile_repo,
            two_factor,
            cache,
            security,
        }
    }

    /// Register a new user and sign them in
    ///
    /// The first account becomes staff.
    pub async fn register(&self, input: RegisterInput) -> Result<(User, Session), UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_registration(&username, &email, &input.password, &input.password_confirm)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "A user with that username already exists.".to_string(),
            ));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "A user with that email already exists.".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        // A concurrent sign-up can still win the name after the checks above.
        let user = self
            .user_repo
            .create_promoting_first(&User::new(username, email, password_hash, false))
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    UserServiceError::UserExists(
                        "A user with that username or email already exists.".to_string(),
                    )
                } else {
                    UserServiceError::InternalError(e)
                }
            })?;
        let session = self.create_session(user.id).await?;

        tracing::info!("Registered user {} ({})", user.username, user.id);
        Ok((user, session))
    }

    /// Check a password
    ///
    /// A wrong password is recorded as a failed attempt. The suspicious
    /// activity check is logged but never blocks the login.
    pub async fn login(
        &self,
        input: LoginInput,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, UserServiceError> {
        let user = match self.authenticate(&input).await? {
            Some(user) => user,
            None => {
                self.two_factor
                    .record_attempt(NewLoginAttempt {
                        user_id: None,
                        username: input.username.clone(),
                        ip_address: client.ip_address.clone(),
                        user_agent: client.user_agent.clone(),
                        email_sent: false,
                        success: false,
                    })
                    .await?;
                tracing::info!("Failed login for '{}' from {}", input.username, client.ip_address);
                return Err(UserServiceError::AuthenticationError(
                    INVALID_CREDENTIALS.to_string(),
                ));
            }
        };

        let check = self.two_factor.check_suspicious_activity(&user, client).await?;
        if check.is_suspicious() {
            tracing::warn!(
                user_id = user.id,
                ip = %client.ip_address,
                new_device = check.new_device,
                recent_failed_attempts = check.recent_failed_attempts,
                "Suspicious login activity"
            );
        }

        if !self.security.two_factor_enabled {
            let session = self.complete_login(&user, client).await?;
            return Ok(LoginOutcome::Authenticated { user, session });
        }

        let challenge = Uuid::new_v4().simple().to_string();
        self.cache
            .set(&challenge_key(&challenge), &user.id, self.challenge_ttl())
            .await?;

        match self
            .two_factor
            .send_verification_code(&user, Some(client), true)
            .await
        {
            Ok(message) => Ok(LoginOutcome::TwoFactorRequired {
                challenge,
                masked_email: user.masked_email(),
                message: message.to_string(),
            }),
            Err(e) => {
                self.cache.delete(&challenge_key(&challenge)).await?;
                Err(e.into())
            }
        }
    }

    /// Exchange a pending challenge and its emailed code for a session
    pub async fn verify_two_factor(
        &self,
        challenge: &str,
        code: &str,
        client: &ClientInfo,
    ) -> Result<(User, Session), UserServiceError> {
        let user = self.pending_user(challenge).await?;

        let code = code.trim();
        if !CODE_RE.is_match(code) {
            return Err(UserServiceError::ValidationError(
                INVALID_CODE_FORMAT.to_string(),
            ));
        }

        self.two_factor.verify_code(&user, code, true).await?;
        self.cache.delete(&challenge_key(challenge)).await?;

        let session = self.complete_login(&user, client).await?;
        tracing::info!("User {} signed in with a verification code", user.id);
        Ok((user, session))
    }

    /// Send a fresh code for a pending login
    pub async fn resend_code(
        &self,
        challenge: &str,
        client: &ClientInfo,
    ) -> Result<ResendOutcome, UserServiceError> {
        let user = match self.pending_user(challenge).await {
            Ok(user) => user,
            Err(UserServiceError::AuthenticationError(message)) => {
                return Ok(ResendOutcome::failed(message))
            }
            Err(e) => return Err(e),
        };

        match self
            .two_factor
            .send_verification_code(&user, Some(client), true)
            .await
        {
            Ok(message) => {
                // The challenge has to outlive the code just sent.
                self.cache
                    .set(&challenge_key(challenge), &user.id, self.challenge_ttl())
                    .await?;
                Ok(ResendOutcome {
                    success: true,
                    message: message.to_string(),
                })
            }
            Err(TwoFactorError::Internal(e)) => Err(e.into()),
            Err(e) => Ok(ResendOutcome::failed(e.to_string())),
        }
    }

    fn challenge_ttl(&self) -> StdDuration {
        StdDuration::from_secs((self.security.code_expiry_minutes.max(1) * 60) as u64)
    }

    async fn pending_user(&self, challenge: &str) -> Result<User, UserServiceError> {
        let user_id: Option<i64> = if challenge.is_empty() {
            None
        } else {
            self.cache.get(&challenge_key(challenge)).await?
        };
        let user_id = user_id
            .ok_or_else(|| UserServiceError::AuthenticationError(NO_PENDING_LOGIN.to_string()))?;

        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to load pending user")?
            .ok_or_else(|| UserServiceError::AuthenticationError(PENDING_USER_MISSING.to_string()))
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user
    ///
    /// Expired sessions are deleted and treated as absent.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?)
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    /// Look the user up by username, then by email, and check the password
    async fn authenticate(&self, input: &LoginInput) -> Result<Option<User>, UserServiceError> {
        let login = input.username.trim();
        let user = match self
            .user_repo
            .get_by_username(login)
            .await
            .context("Failed to get user by username")?
        {
            Some(user) => Some(user),
            None => self
                .user_repo
                .get_by_email(login)
                .await
                .context("Failed to get user by email")?,
        };

        match user {
            Some(user)
                if verify_password(&input.password, &user.password_hash)
                    .context("Failed to verify password")? =>
            {
                Ok(Some(user))
            }
            _ => Ok(None),
        }
    }

    async fn complete_login(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> Result<Session, UserServiceError> {
        self.profile_repo
            .get_or_create(user.id)
            .await
            .context("Failed to ensure profile")?;
        let session = self.create_session(user.id).await?;

        self.two_factor
            .record_attempt(NewLoginAttempt {
                user_id: Some(user.id),
                username: user.username.clone(),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
                email_sent: false,
                success: true,
            })
            .await?;
        Ok(session)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.security.session_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
    password_confirm: &str,
) -> Result<(), UserServiceError> {
    let invalid = |msg: &str| Err(UserServiceError::ValidationError(msg.to_string()));

    if username.is_empty() {
        return invalid("Username is required.");
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return invalid("Ensure the username has at most 150 characters.");
    }
    if !USERNAME_RE.is_match(username) {
        return invalid(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
    if !EMAIL_RE.is_match(email) {
        return invalid("Enter a valid email address.");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return invalid("This password is too short. It must contain at least 8 characters.");
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return invalid("This password is entirely numeric.");
    }
    if password != password_confirm {
        return invalid("The two password fields didn't match.");
    }
    Ok(())
}
