//! Integration tests for Lullwave.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p lullwave-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `functions_endpoints` - HTTP endpoints driven through the router against
//!   the in-memory store
//! - `client_flows` - Client engines working together over shared local state
//!
//! Nothing here needs a database or network; the helpers below build the
//! functions app around [`MemoryStore`].

use std::num::NonZeroU32;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use secrecy::SecretString;
use tower::ServiceExt;

use lullwave_functions::config::{EmailConfig, FunctionsConfig, RateLimitConfig};
use lullwave_functions::db::MemoryStore;
use lullwave_functions::state::AppState;

/// Functions config suitable for tests: no email key, 5 requests per 10 minutes.
///
/// # Panics
///
/// Never; the rate limit constants are valid.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn test_config() -> FunctionsConfig {
    FunctionsConfig {
        database_url: SecretString::from("postgres://unused"),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        public_url: "https://fn.lullwave.test".to_string(),
        email: EmailConfig::default(),
        subscribe_rate: RateLimitConfig::new(
            NonZeroU32::new(5).unwrap(),
            Duration::from_secs(600),
        )
        .unwrap(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Build the functions router over `store`.
///
/// # Panics
///
/// Panics if the mail client cannot be built.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn functions_app(store: MemoryStore) -> Router {
    let state = AppState::new(test_config(), store).unwrap();
    lullwave_functions::app(state)
}

/// Send one request through a fresh clone of `app`.
///
/// # Panics
///
/// Panics if the router fails, which it never does for these services.
#[allow(clippy::unwrap_used)]
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

/// JSON `POST` from `ip`.
///
/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn post_json(uri: &str, ip: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Split a response into status and JSON body (`Null` when empty).
///
/// # Panics
///
/// Panics if the body is not valid JSON.
#[allow(clippy::unwrap_used)]
pub async fn read_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return (status, serde_json::Value::Null);
    }
    (status, serde_json::from_slice(&bytes).unwrap())
}
