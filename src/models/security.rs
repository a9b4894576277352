//! Two-factor codes and login audit rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

/// One-time verification code sent by email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorCode {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub code: String,
    /// Issued during a login rather than for another verification
    pub login_attempt: bool,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TwoFactorCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Unused and not yet expired
    pub fn is_valid(&self) -> bool {
        !self.used && !self.is_expired()
    }
}

/// Audit row for a login step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
    pub email_sent: bool,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Login attempt to record
#[derive(Debug, Clone, Default)]
pub struct NewLoginAttempt {
    pub user_id: Option<i64>,
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
    pub email_sent: bool,
    pub success: bool,
}

/// Where a request came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Result of the suspicious-activity heuristics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityCheck {
    pub too_many_failed_attempts: bool,
    pub new_device: bool,
    pub recent_failed_attempts: i64,
}

impl SecurityCheck {
    pub fn is_suspicious(&self) -> bool {
        self.too_many_failed_attempts || self.new_device
    }
}

/// Staff overview of the last 24 hours
#[derive(Debug, Clone, Serialize)]
pub struct SecurityOverview {
    pub recent_logins: Vec<LoginAttempt>,
    pub suspicious_users: Vec<UserSummary>,
    pub total_2fa_codes: i64,
    pub verified_2fa_codes: i64,
    /// Percentage of issued codes that were used
    pub success_rate: f64,
    pub failed_attempts_count: i64,
    pub successful_attempts_count: i64,
}
