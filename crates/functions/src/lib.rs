//! Lullwave Functions - serverless-style HTTP endpoints.
//!
//! - `POST /functions/v1/landing-subscribe` - waitlist intake with honeypot,
//!   validation, disposable-domain filter, and per-IP rate limiting
//! - `GET /functions/v1/unsubscribe?token=` - one-time unsubscribe links
//! - `POST /functions/v1/send-email` - transactional email sink
//! - `GET /health`, `GET /health/ready`
//!
//! [`app`] builds the full router for any [`db::SubscriberStore`], so the
//! binary serves it over Postgres while tests drive it in memory.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

use std::time::Duration;

use axum::Router;
use axum::http::{Method, header};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use db::SubscriberStore;
use state::AppState;

/// Build the application router with tracing, request IDs, and CORS.
///
/// Sentry layers are added by the binary, outermost.
pub fn app<S: SubscriberStore>(state: AppState<S>) -> Router {
    // The landing page is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    routes::routes()
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(cors)
        .with_state(state)
}
