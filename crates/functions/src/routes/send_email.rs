//! Transactional email sink (`send-email`).
//!
//! Accepts the same payload the app sends for support notifications and
//! answers with a message id, but does not deliver anything. Submissions are
//! logged so they can be inspected.

use axum::{Json, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use lullwave_core::Email;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub id: String,
}

#[instrument(skip_all)]
pub async fn send_email(
    payload: std::result::Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<Json<SendEmailResponse>> {
    let Json(request) = payload
        .map_err(|e| AppError::bad_request_with("Invalid request body.", e.body_text()))?;

    let to = Email::parse(&request.to)
        .map_err(|e| AppError::bad_request_with("Invalid recipient address.", e.to_string()))?;
    if request.subject.trim().is_empty() {
        return Err(AppError::bad_request("Subject is required."));
    }

    let id = Uuid::new_v4().to_string();
    info!(
        message_id = %id,
        to = %to,
        subject = %request.subject,
        html_bytes = request.html.len(),
        "Email accepted (not delivered)"
    );

    Ok(Json(SendEmailResponse { id }))
}
