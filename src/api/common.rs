//! Common API utilities and shared types

use serde::{Deserialize, Serialize};

use crate::models::ListParams;

/// Listing query parameters
///
/// `page` is kept as text so that garbage falls back to the first page
/// instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl PageQuery {
    pub fn params(&self, per_page: u32) -> ListParams {
        ListParams::from_query(self.page.as_deref(), per_page)
    }

    /// Search text, ignoring blank values
    pub fn query(&self) -> Option<String> {
        non_blank(self.q.as_deref())
    }

    pub fn category(&self) -> Option<String> {
        non_blank(self.category.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Plain `{"status": "success", "message": ...}` reply
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }
}
