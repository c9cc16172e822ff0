//! Welcome email delivery through a transactional email HTTP API.
//!
//! Bodies are rendered from Askama templates (HTML and plain text). The API
//! key comes from configuration first, then from the `app_settings` table.

use askama::Template;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::EmailConfig;
use crate::db::{RepositoryError, SubscriberStore, settings};

const WELCOME_SUBJECT: &str = "You're on the Lullwave waitlist";

/// HTML template for the welcome email.
#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    unsubscribe_url: &'a str,
}

/// Plain text template for the welcome email.
#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    unsubscribe_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider did not answer in time.
    #[error("email provider timed out")]
    Timeout,

    /// Provider rejected the request.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// No API key in config or settings.
    #[error("no email API key configured")]
    NoApiKey,

    /// API key lookup failed.
    #[error("settings lookup failed: {0}")]
    Settings(#[from] RepositoryError),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready to hand to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Render the welcome email for a subscriber.
///
/// # Errors
///
/// Returns `EmailError::Template` if rendering fails.
pub fn render_welcome(unsubscribe_url: &str) -> Result<RenderedEmail, EmailError> {
    Ok(RenderedEmail {
        subject: WELCOME_SUBJECT.to_string(),
        html: WelcomeEmailHtml { unsubscribe_url }.render()?,
        text: WelcomeEmailText { unsubscribe_url }.render()?,
    })
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Sends transactional email.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    config: EmailConfig,
}

impl Mailer {
    /// Create a mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Resolve the API key: configuration first, then `app_settings`.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::NoApiKey` if neither source has a key, or
    /// `EmailError::Settings` if the lookup fails.
    pub async fn api_key<S: SubscriberStore>(&self, store: &S) -> Result<SecretString, EmailError> {
        if let Some(key) = &self.config.api_key {
            return Ok(key.clone());
        }
        store
            .setting(settings::EMAIL_API_KEY)
            .await?
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from)
            .ok_or(EmailError::NoApiKey)
    }

    /// Send the welcome email to a new subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if the key can't be resolved, rendering fails, or the
    /// provider rejects the request.
    #[instrument(skip(self, store, unsubscribe_url))]
    pub async fn send_welcome<S: SubscriberStore>(
        &self,
        store: &S,
        to: &str,
        unsubscribe_url: &str,
    ) -> Result<Option<String>, EmailError> {
        let api_key = self.api_key(store).await?;
        let email = render_welcome(unsubscribe_url)?;
        self.send(&api_key, to, &email).await
    }

    /// Post a rendered email to the provider. Returns the provider's message id.
    async fn send(
        &self,
        api_key: &SecretString,
        to: &str,
        email: &RenderedEmail,
    ) -> Result<Option<String>, EmailError> {
        let request = SendRequest {
            from: &self.config.from_address,
            to: [to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmailError::Timeout
                } else {
                    EmailError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let id = response
            .json::<SendResponse>()
            .await
            .ok()
            .and_then(|r| r.id);
        debug!(message_id = ?id, "Email accepted by provider");
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    const URL: &str = "https://fn.lullwave.app/functions/v1/unsubscribe?token=abc123";

    #[test]
    fn test_welcome_includes_unsubscribe_link() {
        let email = render_welcome(URL).unwrap();
        assert_eq!(email.subject, WELCOME_SUBJECT);
        assert!(email.html.contains("token=abc123"));
        assert!(email.text.contains(URL));
    }

    #[tokio::test]
    async fn test_api_key_prefers_config() {
        let store = MemoryStore::new();
        store.set_setting(settings::EMAIL_API_KEY, "from-settings");
        let mailer = Mailer::new(EmailConfig {
            api_key: Some(SecretString::from("from-env")),
            ..EmailConfig::default()
        })
        .unwrap();

        let key = mailer.api_key(&store).await.unwrap();
        assert_eq!(key.expose_secret(), "from-env");
    }

    #[tokio::test]
    async fn test_api_key_falls_back_to_settings() {
        let store = MemoryStore::new();
        store.set_setting(settings::EMAIL_API_KEY, "from-settings");
        let mailer = Mailer::new(EmailConfig::default()).unwrap();

        let key = mailer.api_key(&store).await.unwrap();
        assert_eq!(key.expose_secret(), "from-settings");
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let mailer = Mailer::new(EmailConfig::default()).unwrap();
        let err = mailer.api_key(&MemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, EmailError::NoApiKey));
    }
}
