//! Configuration management
//!
//! Configuration is read from a YAML file (`config.yml` by default) and may be
//! overridden with `QUILLHUB_*` environment variables. Every section and field
//! has a default, so an absent or empty file yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/quillhub.db".to_string()
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL in seconds for entries stored without an explicit one
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Upper bound on the number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Media root; avatars and post media live in subdirectories
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 20MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_image_types")]
    pub image_types: Vec<String>,
    /// Allowed video MIME types
    #[serde(default = "default_video_types")]
    pub video_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            image_types: default_image_types(),
            video_types: default_video_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024
}

fn default_image_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

fn default_video_types() -> Vec<String> {
    vec![
        "video/mp4".to_string(),
        "video/webm".to_string(),
        "video/quicktime".to_string(),
    ]
}

/// Kind of uploaded media, derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl UploadConfig {
    /// Classify a MIME type, returning `None` when it is not allowed
    pub fn classify(&self, mime_type: &str) -> Option<MediaKind> {
        if self.image_types.iter().any(|t| t == mime_type) {
            Some(MediaKind::Image)
        } else if self.video_types.iter().any(|t| t == mime_type) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            _ => "bin",
        }
    }
}

/// Outgoing mail configuration
///
/// An empty `smtp_host` switches the service to a mailer that only logs
/// messages, which is what development setups usually want.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Name shown in email bodies
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: default_from_address(),
            from_name: default_from_name(),
            site_name: default_site_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "Quillhub".to_string()
}

fn default_site_name() -> String {
    "Quillhub".to_string()
}

/// Login and two-factor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Require an emailed code after a correct password
    #[serde(default = "default_true")]
    pub two_factor_enabled: bool,
    #[serde(default = "default_code_expiry_minutes")]
    pub code_expiry_minutes: i64,
    /// Codes that may be requested per rate-limit window
    #[serde(default = "default_max_code_requests")]
    pub max_code_requests: u64,
    /// Verification attempts allowed per rate-limit window
    #[serde(default = "default_max_verify_attempts")]
    pub max_verify_attempts: u64,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Failed logins from one IP within an hour before it is flagged
    #[serde(default = "default_suspicious_failed_attempts")]
    pub suspicious_failed_attempts: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            two_factor_enabled: true,
            code_expiry_minutes: default_code_expiry_minutes(),
            max_code_requests: default_max_code_requests(),
            max_verify_attempts: default_max_verify_attempts(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            session_days: default_session_days(),
            suspicious_failed_attempts: default_suspicious_failed_attempts(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_code_expiry_minutes() -> i64 {
    10
}

fn default_max_code_requests() -> u64 {
    3
}

fn default_max_verify_attempts() -> u64 {
    5
}

fn default_rate_limit_window_secs() -> u64 {
    600
}

fn default_session_days() -> i64 {
    7
}

fn default_suspicious_failed_attempts() -> i64 {
    5
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the defaults. Invalid YAML is reported
    /// with its location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    ///
    /// Recognised variables: `QUILLHUB_SERVER_HOST`, `QUILLHUB_SERVER_PORT`,
    /// `QUILLHUB_SERVER_CORS_ORIGIN`, `QUILLHUB_DATABASE_URL`,
    /// `QUILLHUB_UPLOAD_PATH`, `QUILLHUB_SMTP_HOST`, `QUILLHUB_SMTP_PORT`,
    /// `QUILLHUB_SMTP_USERNAME`, `QUILLHUB_SMTP_PASSWORD`,
    /// `QUILLHUB_EMAIL_FROM` and `QUILLHUB_TWO_FACTOR_ENABLED`.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("QUILLHUB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("QUILLHUB_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("QUILLHUB_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(url) = std::env::var("QUILLHUB_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(path) = std::env::var("QUILLHUB_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }

        if let Ok(host) = std::env::var("QUILLHUB_SMTP_HOST") {
            self.email.smtp_host = host;
        }
        if let Ok(port) = std::env::var("QUILLHUB_SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.email.smtp_port = port;
            }
        }
        if let Ok(username) = std::env::var("QUILLHUB_SMTP_USERNAME") {
            self.email.smtp_username = username;
        }
        if let Ok(password) = std::env::var("QUILLHUB_SMTP_PASSWORD") {
            self.email.smtp_password = password;
        }
        if let Ok(from) = std::env::var("QUILLHUB_EMAIL_FROM") {
            self.email.from_address = from;
        }

        if let Ok(enabled) = std::env::var("QUILLHUB_TWO_FACTOR_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.security.two_factor_enabled = true,
                "0" | "false" | "no" | "off" => self.security.two_factor_enabled = false,
                _ => {} // Ignore invalid values
            }
        }
    }

    /// Reject values that would make the login flow unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let security = &self.security;
        if security.code_expiry_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "security.code_expiry_minutes must be positive".to_string(),
            ));
        }
        if security.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "security.session_days must be positive".to_string(),
            ));
        }
        if security.max_code_requests == 0 || security.max_verify_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "security rate limits must allow at least one request".to_string(),
            ));
        }
        if security.rate_limit_window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "security.rate_limit_window_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_VARS: &[&str] = &[
    "QUILLHUB_SERVER_HOST",
    "QUILLHUB_SERVER_PORT",
    "QUILLHUB_SERVER_CORS_ORIGIN",
    "QUILLHUB_DATABASE_URL",
    "QUILLHUB_UPLOAD_PATH",
    "QUILLHUB_SMTP_HOST",
    "QUILLHUB_SMTP_PORT",
    "QUILLHUB_SMTP_USERNAME",
    "QUILLHUB_SMTP_PASSWORD",
    "QUILLHUB_EMAIL_FROM",
    "QUILLHUB_TWO_FACTOR_ENABLED",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for var in super::ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "data/quillhub.db");
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.upload.path, PathBuf::from("media"));
        assert!(config.email.smtp_host.is_empty());
        assert!(config.security.two_factor_enabled);
        assert_eq!(config.security.code_expiry_minutes, 10);
        assert_eq!(config.security.max_code_requests, 3);
        assert_eq!(config.security.max_verify_attempts, 5);
        assert_eq!(config.security.rate_limit_window_secs, 600);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.session_days, 7);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "security:\n  max_code_requests: 10\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.security.max_code_requests, 10);
        assert_eq!(config.security.max_verify_attempts, 5);
        assert!(config.security.two_factor_enabled);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
database:
  url: "/var/lib/quillhub/site.db"
upload:
  path: "/srv/media"
  max_file_size: 1024
email:
  smtp_host: "smtp.example.com"
  smtp_port: 465
  smtp_username: "mailer"
  smtp_password: "secret"
  from_address: "hello@example.com"
  site_name: "Example"
security:
  two_factor_enabled: false
  code_expiry_minutes: 5
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.url, "/var/lib/quillhub/site.db");
        assert_eq!(config.upload.path, PathBuf::from("/srv/media"));
        assert_eq!(config.upload.max_file_size, 1024);
        assert_eq!(config.email.smtp_host, "smtp.example.com");
        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.email.site_name, "Example");
        assert_eq!(config.email.from_name, "Quillhub");
        assert!(!config.security.two_factor_enabled);
        assert_eq!(config.security.code_expiry_minutes, 5);
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_load_malformed_yaml_reports_location() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: [invalid yaml").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("line"));
    }

    #[test]
    fn test_zero_expiry_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "security:\n  code_expiry_minutes: 0\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("code_expiry_minutes"));
    }

    #[test]
    fn test_classify_media() {
        let upload = UploadConfig::default();
        assert_eq!(upload.classify("image/png"), Some(MediaKind::Image));
        assert_eq!(upload.classify("video/mp4"), Some(MediaKind::Video));
        assert_eq!(upload.classify("application/pdf"), None);
        assert_eq!(upload.get_extension("video/quicktime"), "mov");
        assert_eq!(upload.get_extension("text/plain"), "bin");
    }

    #[test]
    fn test_env_override_server_and_smtp() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("QUILLHUB_SERVER_HOST", "192.168.1.1");
        std::env::set_var("QUILLHUB_SERVER_PORT", "4000");
        std::env::set_var("QUILLHUB_SMTP_HOST", "mail.local");
        std::env::set_var("QUILLHUB_SMTP_PORT", "2525");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.email.smtp_host, "mail.local");
        assert_eq!(config.email.smtp_port, 2525);

        for var in super::ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_env_override_two_factor_toggle() {
        let _guard = lock_env();

        let file = NamedTempFile::new().unwrap();
        std::env::set_var("QUILLHUB_TWO_FACTOR_ENABLED", "off");
        let config = Config::load_with_env(file.path()).unwrap();
        assert!(!config.security.two_factor_enabled);

        std::env::set_var("QUILLHUB_TWO_FACTOR_ENABLED", "maybe");
        let config = Config::load_with_env(file.path()).unwrap();
        assert!(config.security.two_factor_enabled);

        std::env::remove_var("QUILLHUB_TWO_FACTOR_ENABLED");
    }

    #[test]
    fn test_env_override_invalid_port_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();
        std::env::set_var("QUILLHUB_SERVER_PORT", "not_a_number");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);

        std::env::remove_var("QUILLHUB_SERVER_PORT");
    }
}
