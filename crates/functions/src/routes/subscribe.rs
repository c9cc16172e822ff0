//! Landing page waitlist intake (`landing-subscribe`).
//!
//! Checks run cheapest first: honeypot, address format, disposable domain,
//! then the per-IP allowance. Only requests that pass all of them touch the
//! database. The welcome email is best-effort.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use lullwave_core::Email;

use crate::db::SubscriberStore;
use crate::error::{AppError, Result};
use crate::middleware::ClientIp;
use crate::services::EmailError;
use crate::state::AppState;

/// Source recorded on rows created by this endpoint.
const SOURCE: &str = "landing";

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
    /// Hidden form field; real visitors leave it empty.
    #[serde(default)]
    pub honeypot: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
}

/// Add an address to the waitlist.
#[instrument(skip_all)]
pub async fn landing_subscribe<S: SubscriberStore>(
    State(state): State<AppState<S>>,
    ClientIp(ip): ClientIp,
    payload: std::result::Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<Json<SubscribeResponse>> {
    let Json(request) = payload
        .map_err(|e| AppError::bad_request_with("Invalid request body.", e.body_text()))?;

    if request.honeypot.as_deref().is_some_and(|h| !h.trim().is_empty()) {
        info!(ip = %ip, "Honeypot filled, dropping submission");
        return Ok(Json(SubscribeResponse { success: true }));
    }

    let email = Email::parse(&request.email).map_err(|e| {
        AppError::bad_request_with("Please enter a valid email address.", e.to_string())
    })?;

    if email.is_disposable() {
        return Err(AppError::bad_request_with(
            "Please use a permanent email address.",
            format!("disposable domain: {}", email.domain()),
        ));
    }

    if !state.subscribe_limiter().check(ip) {
        warn!(ip = %ip, "Subscribe rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    let subscriber = state.store().upsert_subscriber(&email, SOURCE).await?;
    info!(email = %email, subscriber_id = %subscriber.id, "Waitlist subscription saved");

    if let Some(token) = subscriber.unsubscribe_token.as_deref() {
        let unsubscribe_url = state.config().unsubscribe_url(token);
        match state
            .mailer()
            .send_welcome(state.store(), email.as_str(), &unsubscribe_url)
            .await
        {
            Ok(message_id) => info!(email = %email, message_id = ?message_id, "Welcome email sent"),
            Err(EmailError::NoApiKey) => warn!("No email API key configured, welcome email skipped"),
            Err(e) => warn!(email = %email, error = %e, "Welcome email failed"),
        }
    }

    Ok(Json(SubscribeResponse { success: true }))
}
