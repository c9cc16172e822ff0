//! One-click unsubscribe from email links.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::db::SubscriberStore;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UnsubscribeParams {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub email: String,
}

/// Deactivate the subscriber holding `token`. Tokens are single-use.
#[instrument(skip_all)]
pub async fn unsubscribe<S: SubscriberStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<UnsubscribeParams>,
) -> Result<Json<UnsubscribeResponse>> {
    let token = params
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing unsubscribe token."))?;

    let subscriber = state.store().unsubscribe(token).await?.ok_or_else(|| {
        AppError::bad_request("This unsubscribe link is invalid or has already been used.")
    })?;

    info!(subscriber_id = %subscriber.id, "Subscriber unsubscribed");

    Ok(Json(UnsubscribeResponse {
        success: true,
        email: subscriber.email.into_inner(),
    }))
}
