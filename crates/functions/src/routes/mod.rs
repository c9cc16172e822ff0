//! HTTP route handlers.
//!
//! Function endpoints live under `/functions/v1/{name}`, matching the path the
//! app's backend client invokes.

pub mod health;
pub mod send_email;
pub mod subscribe;
pub mod unsubscribe;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::SubscriberStore;
use crate::state::AppState;

/// Build the function routes.
pub fn routes<S: SubscriberStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness::<S>))
        .route(
            "/functions/v1/landing-subscribe",
            post(subscribe::landing_subscribe::<S>),
        )
        .route(
            "/functions/v1/unsubscribe",
            get(unsubscribe::unsubscribe::<S>),
        )
        .route("/functions/v1/send-email", post(send_email::send_email))
}
