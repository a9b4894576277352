//! Two-factor codes and login attempt audit log

use crate::models::{LoginAttempt, NewLoginAttempt, TwoFactorCode, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

use super::user::row_to_summary;

#[async_trait]
pub trait TwoFactorRepository: Send + Sync {
    async fn create(&self, code: &TwoFactorCode) -> Result<TwoFactorCode>;

    /// Mark unused codes of the same kind used, returning how many changed
    async fn invalidate_unused(&self, user_id: i64, login_attempt: bool) -> Result<i64>;

    /// Latest unused code matching `code`, expired or not
    async fn find_unused(
        &self,
        user_id: i64,
        code: &str,
        login_attempt: bool,
    ) -> Result<Option<TwoFactorCode>>;

    async fn mark_used(&self, id: i64) -> Result<()>;

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64>;

    async fn count_used_since(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Drop codes that expired before now
    async fn delete_expired(&self) -> Result<i64>;
}

#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    async fn create(&self, attempt: &NewLoginAttempt) -> Result<i64>;

    /// Failed password checks from an address; code notifications are not failures
    async fn failed_from_ip_since(&self, ip_address: &str, since: DateTime<Utc>) -> Result<i64>;

    async fn has_successful_login(&self, user_id: i64, ip_address: &str) -> Result<bool>;

    /// Attempts since `since`, newest first
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<LoginAttempt>>;

    async fn count_since(&self, since: DateTime<Utc>, success: bool) -> Result<i64>;

    /// Users with a failed attempt since `since` from an address that
    /// failed at least `threshold` times in the same window
    async fn suspicious_users(
        &self,
        since: DateTime<Utc>,
        threshold: i64,
    ) -> Result<Vec<UserSummary>>;
}

pub struct SqlxTwoFactorRepository {
    pool: SqlitePool,
}

impl SqlxTwoFactorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn TwoFactorRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TwoFactorRepository for SqlxTwoFactorRepository {
    async fn create(&self, code: &TwoFactorCode) -> Result<TwoFactorCode> {
        let result = sqlx::query(
            r#"
            INSERT INTO two_factor_codes (user_id, code, login_attempt, used, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(code.user_id)
        .bind(&code.code)
        .bind(code.login_attempt)
        .bind(code.used)
        .bind(code.created_at)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to store verification code")?;

        Ok(TwoFactorCode {
            id: result.last_insert_rowid(),
            ..code.clone()
        })
    }

    async fn invalidate_unused(&self, user_id: i64, login_attempt: bool) -> Result<i64> {
        let result = sqlx::query(
            "UPDATE two_factor_codes SET used = 1 WHERE user_id = ? AND login_attempt = ? AND used = 0",
        )
        .bind(user_id)
        .bind(login_attempt)
        .execute(&self.pool)
        .await
        .context("Failed to invalidate verification codes")?;
        Ok(result.rows_affected() as i64)
    }

    async fn find_unused(
        &self,
        user_id: i64,
        code: &str,
        login_attempt: bool,
    ) -> Result<Option<TwoFactorCode>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, code, login_attempt, used, created_at, expires_at
            FROM two_factor_codes
            WHERE user_id = ? AND code = ? AND login_attempt = ? AND used = 0
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(login_attempt)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up verification code")?;

        Ok(row.as_ref().map(row_to_code))
    }

    async fn mark_used(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE two_factor_codes SET used = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to mark code used")?;
        Ok(())
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM two_factor_codes WHERE created_at >= ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count codes")?;
        Ok(row.get("count"))
    }

    async fn count_used_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM two_factor_codes WHERE created_at >= ? AND used = 1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count used codes")?;
        Ok(row.get("count"))
    }

    async fn delete_expired(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM two_factor_codes WHERE expires_at < ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to delete expired codes")?;
        Ok(result.rows_affected() as i64)
    }
}

fn row_to_code(row: &SqliteRow) -> TwoFactorCode {
    TwoFactorCode {
        id: row.get("id"),
        user_id: row.get("user_id"),
        code: row.get("code"),
        login_attempt: row.get("login_attempt"),
        used: row.get("used"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

pub struct SqlxLoginAttemptRepository {
    pool: SqlitePool,
}

impl SqlxLoginAttemptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn LoginAttemptRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LoginAttemptRepository for SqlxLoginAttemptRepository {
    async fn create(&self, attempt: &NewLoginAttempt) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO login_attempts
                (user_id, username, ip_address, user_agent, email_sent, success, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.user_id)
        .bind(&attempt.username)
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.email_sent)
        .bind(attempt.success)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to record login attempt")?;
        Ok(result.last_insert_rowid())
    }

    async fn failed_from_ip_since(&self, ip_address: &str, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM login_attempts
            WHERE ip_address = ? AND success = 0 AND email_sent = 0 AND created_at >= ?
            "#,
        )
        .bind(ip_address)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count failed attempts")?;
        Ok(row.get("count"))
    }

    async fn has_successful_login(&self, user_id: i64, ip_address: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM login_attempts
                WHERE user_id = ? AND ip_address = ? AND success = 1
            ) AS found
            "#,
        )
        .bind(user_id)
        .bind(ip_address)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check known devices")?;
        Ok(row.get("found"))
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<LoginAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, username, ip_address, user_agent, email_sent, success, created_at
            FROM login_attempts
            WHERE created_at >= ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list login attempts")?;

        Ok(rows
            .iter()
            .map(|row| LoginAttempt {
                id: row.get("id"),
                user_id: row.get("user_id"),
                username: row.get("username"),
                ip_address: row.get("ip_address"),
                user_agent: row.get("user_agent"),
                email_sent: row.get("email_sent"),
                success: row.get("success"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn count_since(&self, since: DateTime<Utc>, success: bool) -> Result<i64> {
        let sql = if success {
            "SELECT COUNT(*) AS count FROM login_attempts WHERE created_at >= ? AND success = 1"
        } else {
            "SELECT COUNT(*) AS count FROM login_attempts \
             WHERE created_at >= ? AND success = 0 AND email_sent = 0"
        };
        let row = sqlx::query(sql)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count login attempts")?;
        Ok(row.get("count"))
    }

    async fn suspicious_users(
        &self,
        since: DateTime<Utc>,
        threshold: i64,
    ) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT u.id, u.username, u.email, pr.avatar
            FROM login_attempts la
            JOIN users u ON u.id = la.user_id
            LEFT JOIN profiles pr ON pr.user_id = u.id
            WHERE la.success = 0 AND la.email_sent = 0 AND la.created_at >= ?
              AND la.ip_address IN (
                  SELECT ip_address FROM login_attempts
                  WHERE success = 0 AND email_sent = 0 AND created_at >= ?
                  GROUP BY ip_address
                  HAVING COUNT(*) >= ?
              )
            ORDER BY u.username
            "#,
        )
        .bind(since)
        .bind(since)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .context("Failed to find suspicious users")?;

        Ok(rows.iter().map(|r| row_to_summary(r, "")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use chrono::Duration;

    fn new_code(user_id: i64, code: &str, login_attempt: bool, expires_in: Duration) -> TwoFactorCode {
        let now = Utc::now();
        TwoFactorCode {
            id: 0,
            user_id,
            code: code.into(),
            login_attempt,
            used: false,
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    fn failed(user_id: Option<i64>, ip: &str) -> NewLoginAttempt {
        NewLoginAttempt {
            user_id,
            username: "someone".into(),
            ip_address: ip.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_codes_are_scoped_by_kind() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let repo = SqlxTwoFactorRepository::new(pool);

        repo.create(&new_code(alice, "111111", true, Duration::minutes(10)))
            .await
            .unwrap();
        repo.create(&new_code(alice, "222222", false, Duration::minutes(10)))
            .await
            .unwrap();

        assert!(repo.find_unused(alice, "111111", true).await.unwrap().is_some());
        assert!(repo.find_unused(alice, "111111", false).await.unwrap().is_none());

        assert_eq!(repo.invalidate_unused(alice, true).await.unwrap(), 1);
        assert!(repo.find_unused(alice, "111111", true).await.unwrap().is_none());
        assert!(repo.find_unused(alice, "222222", false).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_code_statistics_and_cleanup() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let repo = SqlxTwoFactorRepository::new(pool);
        let since = Utc::now() - Duration::hours(24);

        let live = repo
            .create(&new_code(alice, "123456", true, Duration::minutes(10)))
            .await
            .unwrap();
        repo.create(&new_code(alice, "654321", true, Duration::minutes(-1)))
            .await
            .unwrap();
        repo.mark_used(live.id).await.unwrap();

        assert_eq!(repo.count_since(since).await.unwrap(), 2);
        assert_eq!(repo.count_used_since(since).await.unwrap(), 1);
        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert_eq!(repo.count_since(since).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_attempt_queries() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let repo = SqlxLoginAttemptRepository::new(pool);
        let since = Utc::now() - Duration::hours(1);

        for _ in 0..3 {
            repo.create(&failed(Some(alice), "10.0.0.1")).await.unwrap();
        }
        repo.create(&failed(Some(bob), "10.0.0.2")).await.unwrap();
        repo.create(&NewLoginAttempt {
            user_id: Some(bob),
            username: "bob".into(),
            ip_address: "10.0.0.2".into(),
            success: true,
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(repo.failed_from_ip_since("10.0.0.1", since).await.unwrap(), 3);
        assert!(repo.has_successful_login(bob, "10.0.0.2").await.unwrap());
        assert!(!repo.has_successful_login(alice, "10.0.0.1").await.unwrap());
        assert_eq!(repo.list_since(since).await.unwrap().len(), 5);
        assert_eq!(repo.count_since(since, false).await.unwrap(), 4);
        assert_eq!(repo.count_since(since, true).await.unwrap(), 1);

        let suspicious = repo.suspicious_users(since, 3).await.unwrap();
        assert_eq!(suspicious.len(), 1);
        assert_eq!(suspicious[0].username, "alice");
    }
}
