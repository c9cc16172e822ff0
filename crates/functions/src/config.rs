//! Functions server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FUNCTIONS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `FUNCTIONS_PUBLIC_URL` - Public base URL, used to build unsubscribe links
//!
//! ## Optional
//! - `FUNCTIONS_HOST` - Bind address (default: 127.0.0.1)
//! - `FUNCTIONS_PORT` - Listen port (default: 3000)
//! - `EMAIL_API_KEY` - Transactional email API key (falls back to the
//!   `email_api_key` row in `app_settings`)
//! - `EMAIL_API_URL` - Provider send endpoint (default: `https://api.resend.com/emails`)
//! - `EMAIL_FROM` - Sender address (default: `Lullwave <hello@lullwave.app>`)
//! - `EMAIL_TIMEOUT_SECS` - Provider request timeout (default: 30)
//! - `SUBSCRIBE_RATE_LIMIT` - Subscribe requests allowed per window and IP (default: 5)
//! - `SUBSCRIBE_RATE_WINDOW_SECS` - Rate limit window (default: 600)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance trace sample rate (default: 0.1)

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::time::Duration;

use governor::Quota;
use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Functions server configuration.
#[derive(Debug, Clone)]
pub struct FunctionsConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL (no trailing slash)
    pub public_url: String,
    /// Transactional email provider
    pub email: EmailConfig,
    /// Per-IP limit on the subscribe endpoint
    pub subscribe_rate: RateLimitConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
    /// Fraction of errors reported to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of requests traced
    pub sentry_traces_sample_rate: f32,
}

/// Transactional email configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct EmailConfig {
    /// API key; `None` defers to the settings table
    pub api_key: Option<SecretString>,
    /// Provider send endpoint
    pub api_url: String,
    /// Sender address
    pub from_address: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("from_address", &self.from_address)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.resend.com/emails".to_string(),
            from_address: "Lullwave <hello@lullwave.app>".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A request allowance: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: NonZeroU32,
    pub window: Duration,
    quota: Quota,
}

impl RateLimitConfig {
    /// Build an allowance, or `None` for a zero window.
    #[must_use]
    pub fn new(limit: NonZeroU32, window: Duration) -> Option<Self> {
        let quota = Quota::with_period(window)?.allow_burst(limit);
        Some(Self {
            limit,
            window,
            quota,
        })
    }

    /// Governor quota: a burst of `limit`, regaining one request per `window`.
    ///
    /// No more than `limit` requests are ever let through inside one window.
    #[must_use]
    pub const fn quota(&self) -> Quota {
        self.quota
    }
}

impl FunctionsConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("FUNCTIONS_DATABASE_URL")?;
        let host = parse_env("FUNCTIONS_HOST", "127.0.0.1")?;
        let port = parse_env("FUNCTIONS_PORT", "3000")?;
        let public_url = get_required_env("FUNCTIONS_PUBLIC_URL")?
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&public_url).map_err(|e| {
            ConfigError::InvalidEnvVar("FUNCTIONS_PUBLIC_URL".to_string(), e.to_string())
        })?;

        let email = EmailConfig::from_env()?;
        let subscribe_rate = rate_limit_from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            public_url,
            email,
            subscribe_rate,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Unsubscribe link for a subscriber token.
    #[must_use]
    pub fn unsubscribe_url(&self, token: &str) -> String {
        let mut url = format!("{}/functions/v1/unsubscribe", self.public_url);
        url.push_str("?token=");
        url.extend(url::form_urlencoded::byte_serialize(token.as_bytes()));
        url
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            api_key: get_optional_env("EMAIL_API_KEY")
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            api_url: get_env_or_default("EMAIL_API_URL", &defaults.api_url),
            from_address: get_env_or_default("EMAIL_FROM", &defaults.from_address),
            timeout: Duration::from_secs(parse_env("EMAIL_TIMEOUT_SECS", "30")?),
        })
    }
}

fn rate_limit_from_env() -> Result<RateLimitConfig, ConfigError> {
    let limit: NonZeroU32 = parse_env("SUBSCRIBE_RATE_LIMIT", "5")?;
    let window = Duration::from_secs(parse_env("SUBSCRIBE_RATE_WINDOW_SECS", "600")?);
    RateLimitConfig::new(limit, window).ok_or_else(|| {
        ConfigError::InvalidEnvVar(
            "SUBSCRIBE_RATE_WINDOW_SECS".to_string(),
            "window must be at least one second".to_string(),
        )
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    // Fallback to generic DATABASE_URL (set by managed Postgres attach)
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
