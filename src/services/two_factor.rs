//! Email one-time codes
//!
//! A code is six random digits, valid for a few minutes and usable once.
//! Sending and verifying are rate limited per user with counters kept in
//! the cache (`2fa_rate_limit_{id}` and `2fa_verify_limit_{id}`); each
//! counter lives for the rate-limit window after its last increment.

use crate::cache::{CacheLayer, MemoryCache};
use crate::config::SecurityConfig;
use crate::db::repositories::{LoginAttemptRepository, TwoFactorRepository};
use crate::models::{
    ClientInfo, NewLoginAttempt, SecurityCheck, SecurityOverview, TwoFactorCode, User,
};
use crate::services::email::{EmailService, VerificationEmail};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

pub const TOO_MANY_REQUESTS: &str =
    "Too many code requests. Please wait 10 minutes before requesting again.";
pub const TOO_MANY_ATTEMPTS: &str =
    "Too many verification attempts. Please wait 10 minutes before trying again.";
pub const SEND_FAILED: &str = "Failed to send verification code. Please try again.";
pub const CODE_SENT: &str = "Verification code sent successfully.";
pub const INVALID_CODE: &str = "Invalid verification code.";
pub const CODE_EXPIRED: &str = "Verification code has expired.";
pub const CODE_VERIFIED: &str = "Code verified successfully.";

/// Failed attempts from one address that mark its users as suspicious
const SUSPICIOUS_IP_THRESHOLD: i64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    #[error("{0}")]
    RateLimited(&'static str),

    #[error("{0}")]
    InvalidCode(&'static str),

    #[error("{0}")]
    Expired(&'static str),

    #[error("{0}")]
    SendFailed(&'static str),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Six random decimal digits, zero padded
pub fn generate_code() -> String {
    format!("{:06}", OsRng.next_u32() % 1_000_000)
}

fn send_counter_key(user_id: i64) -> String {
    format!("2fa_rate_limit_{}", user_id)
}

fn verify_counter_key(user_id: i64) -> String {
    format!("2fa_verify_limit_{}", user_id)
}

pub struct TwoFactorService {
    codes: Arc<dyn TwoFactorRepository>,
    attempts: Arc<dyn LoginAttemptRepository>,
    cache: Arc<MemoryCache>,
    email: Arc<EmailService>,
    config: SecurityConfig,
}

impl TwoFactorService {
    pub fn new(
        codes: Arc<dyn TwoFactorRepository>,
        attempts: Arc<dyn LoginAttemptRepository>,
        cache: Arc<MemoryCache>,
        email: Arc<EmailService>,
        config: SecurityConfig,
    ) -> Self {
        Self {
            codes,
            attempts,
            cache,
            email,
            config,
        }
    }

    fn window(&self) -> StdDuration {
        StdDuration::from_secs(self.config.rate_limit_window_secs)
    }

    async fn counter(&self, key: &str) -> Result<u64, TwoFactorError> {
        let count: Option<u64> = self.cache.get(key).await?;
        Ok(count.unwrap_or(0))
    }

    pub async fn can_send_code(&self, user: &User) -> Result<(), TwoFactorError> {
        if self.counter(&send_counter_key(user.id)).await? >= self.config.max_code_requests {
            return Err(TwoFactorError::RateLimited(TOO_MANY_REQUESTS));
        }
        Ok(())
    }

    pub async fn can_verify_code(&self, user: &User) -> Result<(), TwoFactorError> {
        if self.counter(&verify_counter_key(user.id)).await? >= self.config.max_verify_attempts {
            return Err(TwoFactorError::RateLimited(TOO_MANY_ATTEMPTS));
        }
        Ok(())
    }

    /// Issue a fresh code and email it
    ///
    /// Older unused codes of the same kind stop working. For login codes a
    /// `LoginAttempt` with `email_sent` is recorded when the client is known.
    pub async fn send_verification_code(
        &self,
        user: &User,
        client: Option<&ClientInfo>,
        login_attempt: bool,
    ) -> Result<&'static str, TwoFactorError> {
        if let Err(e) = self.can_send_code(user).await {
            tracing::warn!("Code request rate limit exceeded for user {}", user.id);
            return Err(e);
        }

        match self.issue_and_send(user, client, login_attempt).await {
            Ok(()) => {
                tracing::info!("Verification code sent to user {}", user.id);
                Ok(CODE_SENT)
            }
            Err(e) => {
                tracing::error!("Failed to send verification code to user {}: {:#}", user.id, e);
                Err(TwoFactorError::SendFailed(SEND_FAILED))
            }
        }
    }

    async fn issue_and_send(
        &self,
        user: &User,
        client: Option<&ClientInfo>,
        login_attempt: bool,
    ) -> anyhow::Result<()> {
        self.codes.invalidate_unused(user.id, login_attempt).await?;

        let now = Utc::now();
        let code = self
            .codes
            .create(&TwoFactorCode {
                id: 0,
                user_id: user.id,
                code: generate_code(),
                login_attempt,
                used: false,
                created_at: now,
                expires_at: now + Duration::minutes(self.config.code_expiry_minutes),
            })
            .await?;

        self.email
            .send_verification(&VerificationEmail {
                to: &user.email,
                username: &user.username,
                code: &code.code,
                expiry_minutes: self.config.code_expiry_minutes,
                login_attempt,
            })
            .await?;

        self.cache
            .incr(&send_counter_key(user.id), self.window())
            .await?;

        if let (true, Some(client)) = (login_attempt, client) {
            self.attempts
                .create(&NewLoginAttempt {
                    user_id: Some(user.id),
                    username: user.username.clone(),
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                    email_sent: true,
                    success: false,
                })
                .await?;
        }
        Ok(())
    }

    /// Check a submitted code; every checked attempt counts toward the limit
    pub async fn verify_code(
        &self,
        user: &User,
        code: &str,
        login_attempt: bool,
    ) -> Result<&'static str, TwoFactorError> {
        if let Err(e) = self.can_verify_code(user).await {
            tracing::warn!("Verification rate limit exceeded for user {}", user.id);
            return Err(e);
        }

        // Claim an attempt before looking at the code so parallel guesses
        // cannot all slip past the check above.
        let attempt = self
            .cache
            .incr(&verify_counter_key(user.id), self.window())
            .await?;
        if attempt > self.config.max_verify_attempts {
            tracing::warn!("Verification rate limit exceeded for user {}", user.id);
            return Err(TwoFactorError::RateLimited(TOO_MANY_ATTEMPTS));
        }

        let stored = self.codes.find_unused(user.id, code, login_attempt).await?;
        let stored = stored.ok_or(TwoFactorError::InvalidCode(INVALID_CODE))?;
        if !stored.is_valid() {
            return Err(TwoFactorError::Expired(CODE_EXPIRED));
        }

        self.codes.mark_used(stored.id).await?;
        tracing::info!("Verification code accepted for user {}", user.id);
        Ok(CODE_VERIFIED)
    }

    pub async fn record_attempt(&self, attempt: NewLoginAttempt) -> anyhow::Result<()> {
        self.attempts.create(&attempt).await?;
        Ok(())
    }

    /// Heuristics over the audit log; callers log the result, nothing is blocked
    pub async fn check_suspicious_activity(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> anyhow::Result<SecurityCheck> {
        let since = Utc::now() - Duration::hours(1);
        let recent_failed_attempts = self
            .attempts
            .failed_from_ip_since(&client.ip_address, since)
            .await?;
        let known_device = self
            .attempts
            .has_successful_login(user.id, &client.ip_address)
            .await?;

        Ok(SecurityCheck {
            too_many_failed_attempts: recent_failed_attempts
                >= self.config.suspicious_failed_attempts,
            new_device: !known_device,
            recent_failed_attempts,
        })
    }

    /// Login and code statistics for the last 24 hours
    pub async fn security_overview(&self) -> anyhow::Result<SecurityOverview> {
        let since = Utc::now() - Duration::hours(24);

        let total_2fa_codes = self.codes.count_since(since).await?;
        let verified_2fa_codes = self.codes.count_used_since(since).await?;
        let success_rate = if total_2fa_codes > 0 {
            verified_2fa_codes as f64 / total_2fa_codes as f64 * 100.0
        } else {
            0.0
        };

        Ok(SecurityOverview {
            recent_logins: self.attempts.list_since(since).await?,
            suspicious_users: self
                .attempts
                .suspicious_users(since, SUSPICIOUS_IP_THRESHOLD)
                .await?,
            total_2fa_codes,
            verified_2fa_codes,
            success_rate,
            failed_attempts_count: self.attempts.count_since(since, false).await?,
            successful_attempts_count: self.attempts.count_since(since, true).await?,
        })
    }

    /// Remove expired codes
    pub async fn cleanup_expired(&self) -> anyhow::Result<i64> {
        self.codes.delete_expired().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::db::repositories::{SqlxLoginAttemptRepository, SqlxTwoFactorRepository};
    use crate::services::email::MemoryMailer;
    use proptest::prelude::*;
    use sqlx::SqlitePool;

    pub(crate) struct Fixture {
        pub pool: SqlitePool,
        pub service: TwoFactorService,
        pub mailer: Arc<MemoryMailer>,
        pub codes: Arc<dyn TwoFactorRepository>,
    }

    pub(crate) async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let mailer = Arc::new(MemoryMailer::new());
        let email = Arc::new(EmailService::new(mailer.clone(), "Quillhub").unwrap());
        let codes = SqlxTwoFactorRepository::boxed(pool.clone());
        let service = TwoFactorService::new(
            codes.clone(),
            SqlxLoginAttemptRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
            email,
            SecurityConfig::default(),
        );
        Fixture {
            pool,
            service,
            mailer,
            codes,
        }
    }

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            ..User::new(name.into(), format!("{}@example.com", name), "hash".into(), false)
        }
    }

    /// Pull the six-digit code out of the last email
    async fn last_code(mailer: &MemoryMailer) -> String {
        let email = mailer.last().await.unwrap();
        email
            .text
            .split_whitespace()
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_send_and_verify() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");
        let client = ClientInfo::new("10.0.0.1", "test-agent");

        let message = f
            .service
            .send_verification_code(&alice, Some(&client), true)
            .await
            .unwrap();
        assert_eq!(message, CODE_SENT);

        let email = f.mailer.last().await.unwrap();
        assert_eq!(email.to, "alice@example.com");
        assert_eq!(email.subject, "Your Security Verification Code");

        let code = last_code(&f.mailer).await;
        assert_eq!(
            f.service.verify_code(&alice, &code, true).await.unwrap(),
            CODE_VERIFIED
        );
        // single use
        assert!(matches!(
            f.service.verify_code(&alice, &code, true).await,
            Err(TwoFactorError::InvalidCode(INVALID_CODE))
        ));

        let sent_rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM login_attempts WHERE user_id = ? AND email_sent = 1",
        )
        .bind(alice.id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
        assert_eq!(sent_rows, 1);
    }

    #[tokio::test]
    async fn test_new_code_invalidates_previous() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");

        f.service.send_verification_code(&alice, None, true).await.unwrap();
        let first = last_code(&f.mailer).await;
        f.service.send_verification_code(&alice, None, true).await.unwrap();
        let second = last_code(&f.mailer).await;

        if first != second {
            assert!(f.service.verify_code(&alice, &first, true).await.is_err());
        }
        assert!(f.service.verify_code(&alice, &second, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_rate_limit() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");

        for _ in 0..3 {
            f.service.send_verification_code(&alice, None, true).await.unwrap();
        }
        let err = f
            .service
            .send_verification_code(&alice, None, true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), TOO_MANY_REQUESTS);
        assert_eq!(f.mailer.sent().await.len(), 3);
    }

    #[tokio::test]
    async fn test_verify_rate_limit_counts_wrong_codes() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");
        f.service.send_verification_code(&alice, None, true).await.unwrap();
        let code = last_code(&f.mailer).await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..5 {
            let err = f.service.verify_code(&alice, wrong, true).await.unwrap_err();
            assert_eq!(err.to_string(), INVALID_CODE);
        }
        let err = f.service.verify_code(&alice, &code, true).await.unwrap_err();
        assert_eq!(err.to_string(), TOO_MANY_ATTEMPTS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_wrong_codes_respect_verify_limit() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");
        f.service.send_verification_code(&alice, None, true).await.unwrap();
        let code = last_code(&f.mailer).await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let service = Arc::new(f.service);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..12 {
            let service = service.clone();
            let alice = alice.clone();
            tasks.spawn(async move { service.verify_code(&alice, wrong, true).await });
        }

        let mut checked = 0;
        let mut limited = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap().unwrap_err().to_string().as_str() {
                INVALID_CODE => checked += 1,
                TOO_MANY_ATTEMPTS => limited += 1,
                other => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(checked, 5);
        assert_eq!(limited, 7);
    }

    #[tokio::test]
    async fn test_expired_code() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");
        let now = Utc::now();
        f.codes
            .create(&TwoFactorCode {
                id: 0,
                user_id: alice.id,
                code: "123456".into(),
                login_attempt: true,
                used: false,
                created_at: now - Duration::minutes(11),
                expires_at: now - Duration::minutes(1),
            })
            .await
            .unwrap();

        let err = f.service.verify_code(&alice, "123456", true).await.unwrap_err();
        assert_eq!(err.to_string(), CODE_EXPIRED);
        assert_eq!(f.service.cleanup_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_message() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");
        f.mailer.set_failing(true);

        let err = f
            .service
            .send_verification_code(&alice, None, true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), SEND_FAILED);

        // failed sends do not use up the request budget
        f.mailer.set_failing(false);
        for _ in 0..3 {
            f.service.send_verification_code(&alice, None, true).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_suspicious_activity() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");
        let client = ClientInfo::new("10.1.1.1", "agent");

        let check = f.service.check_suspicious_activity(&alice, &client).await.unwrap();
        assert!(check.new_device);
        assert!(!check.too_many_failed_attempts);

        for _ in 0..5 {
            f.service
                .record_attempt(NewLoginAttempt {
                    username: "alice".into(),
                    ip_address: client.ip_address.clone(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        f.service
            .record_attempt(NewLoginAttempt {
                user_id: Some(alice.id),
                username: "alice".into(),
                ip_address: client.ip_address.clone(),
                success: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let check = f.service.check_suspicious_activity(&alice, &client).await.unwrap();
        assert_eq!(check.recent_failed_attempts, 5);
        assert!(check.too_many_failed_attempts);
        assert!(!check.new_device);
        assert!(check.is_suspicious());
    }

    #[tokio::test]
    async fn test_security_overview() {
        let f = fixture().await;
        let alice = user(insert_user(&f.pool, "alice").await, "alice");

        f.service.send_verification_code(&alice, None, true).await.unwrap();
        f.service.send_verification_code(&alice, None, true).await.unwrap();
        let latest = last_code(&f.mailer).await;
        f.service.verify_code(&alice, &latest, true).await.unwrap();

        let overview = f.service.security_overview().await.unwrap();
        assert_eq!(overview.total_2fa_codes, 2);
        // the first code was invalidated by marking it used
        assert_eq!(overview.verified_2fa_codes, 2);
        assert!((overview.success_rate - 100.0).abs() < f64::EPSILON);
        assert_eq!(overview.failed_attempts_count, 0);
    }

    proptest! {
        #[test]
        fn prop_generated_codes_are_six_digits(_ in 0..50u8) {
            let code = generate_code();
            prop_assert_eq!(code.len(), 6);
            prop_assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
