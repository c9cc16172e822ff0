//! Database operations for the functions `PostgreSQL`.
//!
//! ## Tables
//!
//! - `subscribers` - Waitlist addresses with active flag and one-time unsubscribe token
//! - `app_settings` - Key/value runtime settings (e.g. `email_api_key`)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/functions/migrations/` and run via:
//! ```bash
//! cargo run -p lw-cli -- migrate
//! ```
//!
//! Handlers only see the [`SubscriberStore`] trait; [`PgStore`] backs it in
//! production and [`MemoryStore`] in tests.

mod memory;
pub mod settings;
pub mod subscribers;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryStore;
pub use subscribers::{Subscriber, generate_unsubscribe_token};

use lullwave_core::Email;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The store could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Persistence used by the HTTP handlers.
pub trait SubscriberStore: Send + Sync + 'static {
    /// Insert or reactivate the subscriber for `email`, making sure it holds
    /// an unsubscribe token.
    fn upsert_subscriber(
        &self,
        email: &Email,
        source: &str,
    ) -> impl Future<Output = Result<Subscriber, RepositoryError>> + Send;

    /// Deactivate the subscriber holding `token` and consume the token.
    ///
    /// Returns `None` when no subscriber holds the token.
    fn unsubscribe(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<Subscriber>, RepositoryError>> + Send;

    /// Read a runtime setting.
    fn setting(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Cheap liveness probe for readiness checks.
    fn ping(&self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// `PostgreSQL`-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl SubscriberStore for PgStore {
    async fn upsert_subscriber(
        &self,
        email: &Email,
        source: &str,
    ) -> Result<Subscriber, RepositoryError> {
        subscribers::upsert(&self.pool, email, source).await
    }

    async fn unsubscribe(&self, token: &str) -> Result<Option<Subscriber>, RepositoryError> {
        subscribers::unsubscribe(&self.pool, token).await
    }

    async fn setting(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        settings::get_setting(&self.pool, key).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
