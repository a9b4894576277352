//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

/// Comment on a post, joined with its author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: UserSummary,
    pub content: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Timestamp in the `March 05, 2025 14:07` style used by the comment API
    pub fn display_time(&self) -> String {
        format_display_time(&self.created_at)
    }
}

pub fn format_display_time(at: &DateTime<Utc>) -> String {
    at.format("%B %d, %Y %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_time_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 5, 14, 7, 0).unwrap();
        assert_eq!(format_display_time(&at), "March 05, 2025 14:07");
    }
}
