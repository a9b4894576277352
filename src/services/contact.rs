//! Contact form and newsletter

use crate::db::repositories::ContactRepository;
use crate::models::{ContactInput, ContactMessage, NewsletterSubscriber};
use crate::services::error::{limit_text, require_text, ContentError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub const CONTACT_THANKS: &str = "Thank you for your message! We will get back to you soon.";
pub const SUBSCRIBED: &str = "Thank you for subscribing to our newsletter!";
pub const ALREADY_SUBSCRIBED: &str = "This email is already subscribed.";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

pub struct ContactService {
    repo: Arc<dyn ContactRepository>,
}

impl ContactService {
    pub fn new(repo: Arc<dyn ContactRepository>) -> Self {
        Self { repo }
    }

    /// Store a message from the contact form
    ///
    /// A subject, when given, becomes the first line of the stored message.
    pub async fn submit(&self, input: ContactInput) -> Result<ContactMessage, ContentError> {
        require_text("Name", &input.name, 100)?;
        let email = valid_email(&input.email)?;
        require_text("Message", &input.message, 5000)?;
        limit_text("Subject", &input.subject, 200)?;

        let subject = input.subject.trim();
        let message = if subject.is_empty() {
            input.message.trim().to_string()
        } else {
            format!("{}\n\n{}", subject, input.message.trim())
        };

        let stored = self
            .repo
            .create_message(input.name.trim(), &email, &message)
            .await?;
        tracing::info!("Contact message {} received from {}", stored.id, stored.email);
        Ok(stored)
    }

    pub async fn messages(&self) -> Result<Vec<ContactMessage>, ContentError> {
        Ok(self.repo.list_messages().await?)
    }

    pub async fn mark_responded(&self, id: i64) -> Result<(), ContentError> {
        if !self.repo.mark_responded(id).await? {
            return Err(ContentError::not_found("Message"));
        }
        Ok(())
    }

    /// Subscribe an address, returning the message to show
    ///
    /// Subscribing twice is reported, not rejected.
    pub async fn subscribe(&self, email: &str) -> Result<(bool, &'static str), ContentError> {
        let email = valid_email(email)?;
        if self.repo.subscribe(&email).await? {
            Ok((true, SUBSCRIBED))
        } else {
            Ok((false, ALREADY_SUBSCRIBED))
        }
    }

    pub async fn subscribers(&self) -> Result<Vec<NewsletterSubscriber>, ContentError> {
        Ok(self.repo.subscribers().await?)
    }
}

fn valid_email(email: &str) -> Result<String, ContentError> {
    let email = email.trim().to_lowercase();
    if email.len() > 254 || !EMAIL_RE.is_match(&email) {
        return Err(ContentError::validation("Enter a valid email address."));
    }
    Ok(email)
}
