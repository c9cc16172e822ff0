//! Client for the hosted backend.
//!
//! # Surfaces
//!
//! - Tables: `GET|POST|PATCH {base}/rest/v1/{table}` with [`Query`] filters
//! - Storage: `POST {base}/storage/v1/object/{bucket}/{path}`, public objects
//!   served from `{base}/storage/v1/object/public/{bucket}/{path}`
//! - Functions: `POST {base}/functions/v1/{name}`
//! - Live channels: [`BackendClient::subscribe_inserts`] polls a filtered table
//!   for rows not yet delivered
//!
//! Access control is enforced by the backend; this client only forwards the
//! anon key and, once signed in, the user's access token.

mod query;
pub mod realtime;

pub use query::{Order, Query};
pub use realtime::{InsertCursor, Subscription};

use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::BackendConfig;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Backend returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A write returned no row where one was expected.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The configured base URL is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl BackendError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }

    /// Whether the failure was a uniqueness conflict (HTTP 409).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }
}

/// How an upsert treats rows that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the existing row untouched.
    Ignore,
    /// Overwrite the existing row with the new values.
    Merge,
}

/// Client for the hosted backend.
///
/// Cheap to clone; clones share the HTTP connection pool and session token.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    access_token: RwLock<Option<SecretString>>,
    poll_interval: Duration,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(&config.url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(BackendError::from_reqwest)?;

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                base_url,
                anon_key: config.anon_key.clone(),
                access_token: RwLock::new(None),
                poll_interval: config.realtime_poll_interval,
            }),
        })
    }

    /// Attach (or clear) the signed-in user's access token.
    pub fn set_access_token(&self, token: Option<SecretString>) {
        *self
            .inner
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let anon = self.inner.anon_key.expose_secret();
        let bearer = self
            .inner
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or_else(|| anon.to_string(), |t| t.expose_secret().to_string());

        if let Ok(value) = HeaderValue::from_str(anon) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {bearer}")) {
            headers.insert("Authorization", value);
        }
        headers
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let response = request
            .headers(self.auth_headers())
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(BackendError::from_reqwest)?;

        if !status.is_success() {
            debug!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
        if body.trim().is_empty() {
            return Ok(serde_json::from_str("[]")?);
        }
        Ok(serde_json::from_str(body)?)
    }

    /// Select rows from `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or rows cannot be decoded.
    #[instrument(skip(self, query), fields(table = %table))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        query.apply(&mut url);
        let body = self.send(self.inner.client.get(url)).await?;
        Self::decode(&body)
    }

    /// Insert one row and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no row is returned.
    #[instrument(skip(self, row), fields(table = %table))]
    pub async fn insert<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        row: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .inner
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(row);
        let body = self.send(request).await?;
        Self::first_row(table, &body)
    }

    /// Insert many rows in one request without reading them back.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, rows), fields(table = %table, count = rows.len()))]
    pub async fn insert_batch<B: Serialize + Sync>(
        &self,
        table: &str,
        rows: &[B],
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .inner
            .client
            .post(url)
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(request).await?;
        Ok(())
    }

    /// Insert a row, resolving uniqueness conflicts on `conflict_columns`.
    ///
    /// Returns the stored row, or `None` when an ignored duplicate produced no
    /// representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, row), fields(table = %table))]
    pub async fn upsert<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        row: &B,
        conflict_columns: &str,
        on_conflict: OnConflict,
    ) -> Result<Option<T>, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        url.query_pairs_mut()
            .append_pair("on_conflict", conflict_columns);
        let resolution = match on_conflict {
            OnConflict::Ignore => "resolution=ignore-duplicates",
            OnConflict::Merge => "resolution=merge-duplicates",
        };
        let request = self
            .inner
            .client
            .post(url)
            .header("Prefer", format!("return=representation,{resolution}"))
            .json(row);
        let body = self.send(request).await?;
        let mut rows: Vec<T> = Self::decode(&body)?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Update rows matching `filter` and return them.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. An unfiltered update is refused
    /// by the backend.
    #[instrument(skip(self, filter, patch), fields(table = %table))]
    pub async fn update<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &Query,
        patch: &B,
    ) -> Result<Vec<T>, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        filter.apply(&mut url);
        let request = self
            .inner
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(patch);
        let body = self.send(request).await?;
        Self::decode(&body)
    }

    /// Upload an object to a storage bucket and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    #[instrument(skip(self, bytes), fields(bucket = %bucket, path = %path, size = bytes.len()))]
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = self.endpoint(&format!("storage/v1/object/{bucket}/{path}"))?;
        let request = self
            .inner
            .client
            .post(url)
            .header("Content-Type", content_type)
            .body(bytes);
        self.send(request).await?;
        self.public_url(bucket, path)
    }

    /// Public URL of an object in a public bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be joined onto the base URL.
    pub fn public_url(&self, bucket: &str, path: &str) -> Result<String, BackendError> {
        Ok(self
            .endpoint(&format!("storage/v1/object/public/{bucket}/{path}"))?
            .to_string())
    }

    /// Invoke a serverless function with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response cannot be decoded.
    #[instrument(skip(self, body), fields(function = %function))]
    pub async fn invoke<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        function: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(&format!("functions/v1/{function}"))?;
        let response = self.send(self.inner.client.post(url).json(body)).await?;
        Ok(serde_json::from_str(&response)?)
    }

    /// Open a live channel delivering rows inserted into `table` that match
    /// `filter`, from `since` on.
    ///
    /// `stamp` extracts each row's key and insertion time. Every poll re-reads
    /// a short overlap behind the newest row seen, so rows sharing a timestamp
    /// or committing late are still delivered, each exactly once. Poll
    /// failures are logged and retried on the next tick.
    pub fn subscribe_inserts<T, K, F>(
        &self,
        table: &str,
        filter: Query,
        since: DateTime<Utc>,
        stamp: F,
    ) -> Subscription<T>
    where
        T: DeserializeOwned + Send + 'static,
        K: Eq + Hash + Send + 'static,
        F: Fn(&T) -> (K, DateTime<Utc>) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(realtime::CHANNEL_CAPACITY);
        let client = self.clone();
        let table = table.to_owned();
        let poll_interval = self.inner.poll_interval;

        let feeder = tokio::spawn(async move {
            let mut cursor = InsertCursor::new(since);
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let query = filter
                    .clone()
                    .gte("created_at", cursor.floor().to_rfc3339())
                    .order("created_at", Order::Asc);

                let rows: Vec<T> = match client.select(&table, &query).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(table = %table, error = %e, "Live channel poll failed");
                        continue;
                    }
                };

                for row in rows {
                    let (key, created_at) = stamp(&row);
                    if !cursor.admit(key, created_at) {
                        continue;
                    }
                    if tx.send(row).await.is_err() {
                        // Receiver dropped without aborting us; nothing left to feed
                        return;
                    }
                }
            }
        });

        Subscription::new(rx, feeder)
    }

    fn first_row<T: DeserializeOwned>(table: &str, body: &str) -> Result<T, BackendError> {
        let mut rows: Vec<T> = Self::decode(body)?;
        if rows.is_empty() {
            return Err(BackendError::NotFound(format!("no row returned from {table}")));
        }
        Ok(rows.swap_remove(0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(url: &str) -> BackendClient {
        BackendClient::new(&BackendConfig {
            url: url.to_string(),
            anon_key: SecretString::from("anon-key"),
            timeout: Duration::from_secs(5),
            realtime_poll_interval: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_public_url_with_and_without_trailing_slash() {
        for base in ["https://backend.test", "https://backend.test/"] {
            let url = client(base)
                .public_url("ticket-attachments", "t1/photo.png")
                .unwrap();
            assert_eq!(
                url,
                "https://backend.test/storage/v1/object/public/ticket-attachments/t1/photo.png"
            );
        }
    }

    #[test]
    fn test_base_path_is_preserved() {
        let url = client("https://gateway.test/project")
            .public_url("b", "p")
            .unwrap();
        assert_eq!(url, "https://gateway.test/project/storage/v1/object/public/b/p");
    }

    #[test]
    fn test_auth_headers_use_anon_key_until_signed_in() {
        let backend = client("https://backend.test");
        let headers = backend.auth_headers();
        assert_eq!(headers.get("apikey").unwrap(), "anon-key");
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer anon-key");

        backend.set_access_token(Some(SecretString::from("user-jwt")));
        let headers = backend.auth_headers();
        assert_eq!(headers.get("apikey").unwrap(), "anon-key");
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer user-jwt");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = BackendClient::new(&BackendConfig {
            url: "not a url".to_string(),
            anon_key: SecretString::from("k"),
            timeout: Duration::from_secs(5),
            realtime_poll_interval: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(BackendError::InvalidUrl(_))));
    }

    #[test]
    fn test_conflict_detection() {
        let err = BackendError::Api {
            status: 409,
            message: "duplicate key".to_string(),
        };
        assert!(err.is_conflict());
        assert!(!BackendError::Timeout.is_conflict());
    }
}
