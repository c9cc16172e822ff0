//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::db::SubscriberStore;
use crate::state::AppState;

pub async fn health() -> &'static str {
    "ok"
}

/// 200 when the database answers, 503 otherwise.
pub async fn readiness<S: SubscriberStore>(State(state): State<AppState<S>>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
