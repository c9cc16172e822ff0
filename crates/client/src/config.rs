//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LULLWAVE_BACKEND_URL` - Base URL of the hosted backend
//! - `LULLWAVE_BACKEND_ANON_KEY` - Public (anon) API key for the backend
//! - `STOREFRONT_API_URL` - Base URL of the merch storefront API
//! - `STOREFRONT_TOKEN` - Storefront access token
//!
//! ## Optional
//! - `LULLWAVE_STATE_DIR` - Directory for device-local state (default: `.lullwave`)
//! - `BACKEND_TIMEOUT_SECS` - Per-request timeout for backend calls (default: 30)
//! - `REALTIME_POLL_MILLIS` - Live channel poll interval (default: 2000)
//! - `ANALYTICS_FLUSH_SECS` - Analytics flush interval (default: 10)
//! - `ANALYTICS_HEARTBEAT_SECS` - Analytics heartbeat interval (default: 30)
//! - `ANALYTICS_MAX_BUFFER` - Maximum buffered analytics events (default: 200)

use std::path::PathBuf;
use std::time::Duration;

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

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hosted backend connection
    pub backend: BackendConfig,
    /// Merch storefront API
    pub storefront: StorefrontConfig,
    /// Analytics buffering
    pub analytics: AnalyticsConfig,
    /// Directory holding the device-local state file
    pub state_dir: PathBuf,
}

/// Hosted backend configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL (e.g., `https://project.example.co`)
    pub url: String,
    /// Public anon key sent with every request
    pub anon_key: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
    /// How often live channels poll for new rows
    pub realtime_poll_interval: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("realtime_poll_interval", &self.realtime_poll_interval)
            .finish()
    }
}

/// Storefront API configuration.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Base URL of the storefront REST API
    pub api_url: String,
    /// Access token passed as `storefront_token`
    pub token: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("api_url", &self.api_url)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Analytics buffering configuration.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Interval between timed flushes
    pub flush_interval: Duration,
    /// Interval between heartbeat events
    pub heartbeat_interval: Duration,
    /// Maximum number of buffered events; oldest are dropped beyond this
    pub max_buffer: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            max_buffer: 200,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let timeout = Duration::from_secs(get_parsed_env("BACKEND_TIMEOUT_SECS", 30)?);

        let backend = BackendConfig {
            url: get_required_env("LULLWAVE_BACKEND_URL")?,
            anon_key: SecretString::from(get_required_env("LULLWAVE_BACKEND_ANON_KEY")?),
            timeout,
            realtime_poll_interval: Duration::from_millis(get_parsed_env(
                "REALTIME_POLL_MILLIS",
                2000,
            )?),
        };

        let storefront = StorefrontConfig {
            api_url: get_required_env("STOREFRONT_API_URL")?,
            token: SecretString::from(get_required_env("STOREFRONT_TOKEN")?),
            timeout,
        };

        let analytics = AnalyticsConfig {
            flush_interval: Duration::from_secs(get_parsed_env("ANALYTICS_FLUSH_SECS", 10)?),
            heartbeat_interval: Duration::from_secs(get_parsed_env(
                "ANALYTICS_HEARTBEAT_SECS",
                30,
            )?),
            max_buffer: get_parsed_env("ANALYTICS_MAX_BUFFER", 200)?,
        };

        let state_dir = PathBuf::from(get_env_or_default("LULLWAVE_STATE_DIR", ".lullwave"));

        Ok(Self {
            backend,
            storefront,
            analytics,
            state_dir,
        })
    }

    /// Path of the device-local state file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("local_state.json")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional environment variable parsed into `T`, or `default` when unset.
fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_config_debug_redacts_key() {
        let config = BackendConfig {
            url: "https://backend.example.co".to_string(),
            anon_key: SecretString::from("super_secret_anon_key"),
            timeout: Duration::from_secs(30),
            realtime_poll_interval: Duration::from_secs(2),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("https://backend.example.co"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_anon_key"));
    }

    #[test]
    fn test_storefront_config_debug_redacts_token() {
        let config = StorefrontConfig {
            api_url: "https://shop.example.com/api".to_string(),
            token: SecretString::from("storefront_token_value"),
            timeout: Duration::from_secs(30),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("storefront_token_value"));
    }

    #[test]
    fn test_analytics_defaults() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.flush_interval, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_buffer, 200);
    }

    #[test]
    fn test_get_parsed_env_default_when_unset() {
        let value: u64 = get_parsed_env("LULLWAVE_TEST_SURELY_UNSET_VAR", 7).unwrap_or(0);
        assert_eq!(value, 7);
    }
}
