//! Outgoing email
//!
//! Messages are rendered from tera templates embedded at build time and
//! handed to a [`Mailer`]. SMTP is used when a host is configured;
//! otherwise messages are only logged.

use crate::config::EmailConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};
use tokio::sync::Mutex;

pub const VERIFICATION_SUBJECT: &str = "Your Security Verification Code";

const VERIFICATION_TXT: &str = include_str!("../../templates/email/verification_code.txt");
const VERIFICATION_HTML: &str = include_str!("../../templates/email/verification_code.html");

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Delivery backend
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// SMTP delivery over STARTTLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from: sender_mailbox(config)?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email
                .to
                .parse::<Mailbox>()
                .map_err(|e| anyhow!("Invalid recipient address: {}", e))?)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured, email not delivered:\n{}",
            email.text
        );
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutgoingEmail>>,
    failing: AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().await.clone()
    }

    pub async fn last(&self) -> Option<OutgoingEmail> {
        self.outbox.lock().await.last().cloned()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("Mail server unavailable"));
        }
        self.outbox.lock().await.push(email.clone());
        Ok(())
    }
}

fn sender_mailbox(config: &EmailConfig) -> Result<Mailbox> {
    let address = config
        .from_address
        .parse::<Address>()
        .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from_address, e))?;
    let name = (!config.from_name.is_empty()).then(|| config.from_name.clone());
    Ok(Mailbox::new(name, address))
}

/// Pick the delivery backend for the configuration
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    if config.smtp_host.is_empty() {
        tracing::warn!("No SMTP host configured, verification emails will only be logged");
        return Ok(Arc::new(LogMailer));
    }
    Ok(Arc::new(SmtpMailer::new(config)?))
}

/// Values available to the verification templates
#[derive(Debug, Clone)]
pub struct VerificationEmail<'a> {
    pub to: &'a str,
    pub username: &'a str,
    pub code: &'a str,
    pub expiry_minutes: i64,
    pub login_attempt: bool,
}

/// Renders and sends account emails
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    tera: Tera,
    site_name: String,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, site_name: impl Into<String>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("verification_code.txt", VERIFICATION_TXT),
            ("verification_code.html", VERIFICATION_HTML),
        ])
        .context("Failed to load email templates")?;

        Ok(Self {
            mailer,
            tera,
            site_name: site_name.into(),
        })
    }

    pub fn render_verification(&self, email: &VerificationEmail<'_>) -> Result<OutgoingEmail> {
        let mut context = TeraContext::new();
        context.insert("username", email.username);
        context.insert("code", email.code);
        context.insert("expiry_minutes", &email.expiry_minutes);
        context.insert("site_name", &self.site_name);
        context.insert("login_attempt", &email.login_attempt);

        Ok(OutgoingEmail {
            to: email.to.to_string(),
            subject: VERIFICATION_SUBJECT.to_string(),
            text: self
                .tera
                .render("verification_code.txt", &context)
                .context("Failed to render text email")?,
            html: self
                .tera
                .render("verification_code.html", &context)
                .context("Failed to render HTML email")?,
        })
    }

    pub async fn send_verification(&self, email: &VerificationEmail<'_>) -> Result<()> {
        let message = self.render_verification(email)?;
        self.mailer.send(&message).await
    }
}
