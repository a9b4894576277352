//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Like,
    Comment,
    Share,
    Follow,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationType::Like => write!(f, "like"),
            NotificationType::Comment => write!(f, "comment"),
            NotificationType::Share => write!(f, "share"),
            NotificationType::Follow => write!(f, "follow"),
        }
    }
}

impl FromStr for NotificationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(NotificationType::Like),
            "comment" => Ok(NotificationType::Comment),
            "share" => Ok(NotificationType::Share),
            "follow" => Ok(NotificationType::Follow),
            _ => Err(anyhow::anyhow!("Invalid notification type: {}", s)),
        }
    }
}

/// Notification to insert
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub sender_id: i64,
    pub notification_type: NotificationType,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
}

/// Stored notification joined with its sender and post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub sender: UserSummary,
    pub notification_type: NotificationType,
    pub post_id: Option<i64>,
    pub post_slug: Option<String>,
    pub post_title: Option<String>,
    pub comment_id: Option<i64>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
