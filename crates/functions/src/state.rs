//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::FunctionsConfig;
use crate::db::SubscriberStore;
use crate::middleware::IpRateLimiter;
use crate::services::{EmailError, Mailer};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; generic over the persistence backend so tests
/// can run the router against an in-memory store.
pub struct AppState<S: SubscriberStore> {
    inner: Arc<AppStateInner<S>>,
}

struct AppStateInner<S> {
    config: FunctionsConfig,
    store: S,
    mailer: Mailer,
    subscribe_limiter: IpRateLimiter,
}

impl<S: SubscriberStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SubscriberStore> AppState<S> {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the mail client cannot be built.
    pub fn new(config: FunctionsConfig, store: S) -> Result<Self, EmailError> {
        let mailer = Mailer::new(config.email.clone())?;
        let subscribe_limiter = IpRateLimiter::new(&config.subscribe_rate);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                mailer,
                subscribe_limiter,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &FunctionsConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    #[must_use]
    pub fn mailer(&self) -> &Mailer {
        &self.inner.mailer
    }

    #[must_use]
    pub fn subscribe_limiter(&self) -> &IpRateLimiter {
        &self.inner.subscribe_limiter
    }
}
