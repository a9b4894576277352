//! User and profile models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Staff accounts reach the admin endpoints
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user; the password must already be hashed
    pub fn new(username: String, email: String, password_hash: String, is_staff: bool) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            is_staff,
            created_at: now,
            updated_at: now,
        }
    }

    /// Email with everything but the first two characters of the local part hidden
    ///
    /// `alice@example.com` becomes `al***@example.com`.
    pub fn masked_email(&self) -> String {
        let (local, domain) = self.email.split_once('@').unwrap_or((&self.email, ""));
        let visible: String = local.chars().take(2).collect();
        format!("{}***@{}", visible, domain)
    }
}

/// Per-user profile, created together with the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub bio: String,
    /// Path relative to the media root, e.g. `avatars/abc.png`
    pub avatar: Option<String>,
}

impl Profile {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            bio: String::new(),
            avatar: None,
        }
    }
}

/// Public view of a user embedded in other responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub avatar_url: String,
}

impl UserSummary {
    pub fn new(id: i64, username: String, email: &str, avatar: Option<&str>) -> Self {
        Self {
            id,
            username,
            avatar_url: avatar_url(email, avatar),
        }
    }
}

/// Uploaded avatar URL, or a Gravatar derived from the email
pub fn avatar_url(email: &str, avatar: Option<&str>) -> String {
    match avatar {
        Some(path) if !path.is_empty() => format!("/media/{}", path),
        _ => {
            let hash = format!("{:x}", md5::compute(email.trim().to_lowercase()));
            format!("https://www.gravatar.com/avatar/{}?d=mp&s=80", hash)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_email() {
        let user = User::new("alice".into(), "alice@example.com".into(), "h".into(), false);
        assert_eq!(user.masked_email(), "al***@example.com");

        let short = User::new("b".into(), "b@x.io".into(), "h".into(), false);
        assert_eq!(short.masked_email(), "b***@x.io");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("alice".into(), "a@b.c".into(), "secret-hash".into(), false);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"is_staff\":false"));
    }

    #[test]
    fn test_avatar_url() {
        assert_eq!(
            avatar_url("a@b.c", Some("avatars/x.png")),
            "/media/avatars/x.png"
        );
        let gravatar = avatar_url(" A@B.C ", None);
        assert_eq!(gravatar, avatar_url("a@b.c", Some("")));
        assert!(gravatar.starts_with("https://www.gravatar.com/avatar/"));
    }
}
