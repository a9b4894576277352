//! Errors shared by the content services

/// Error type for posts, comments, social, showcase and site operations
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("{0}")]
    NotFound(String),

    /// The caller is known but may not touch the resource
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ContentError {
    pub fn not_found(what: &str) -> Self {
        ContentError::NotFound(format!("{} not found", what))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ContentError::Validation(message.into())
    }
}

/// Reject empty or over-long required text fields
pub(crate) fn require_text(field: &str, value: &str, max_chars: usize) -> Result<(), ContentError> {
    if value.trim().is_empty() {
        return Err(ContentError::validation(format!("{} is required", field)));
    }
    limit_text(field, value, max_chars)
}

pub(crate) fn limit_text(field: &str, value: &str, max_chars: usize) -> Result<(), ContentError> {
    if value.chars().count() > max_chars {
        return Err(ContentError::validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(())
}
