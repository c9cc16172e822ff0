//! Waitlist subscriber queries.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;

use lullwave_core::{Email, SubscriberId};

use super::RepositoryError;

/// Bytes of randomness in an unsubscribe token.
const TOKEN_BYTES: usize = 32;

/// A waitlist subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: Email,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub unsubscribe_token: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fresh, URL-safe unsubscribe token (hex encoded).
#[must_use]
pub fn generate_unsubscribe_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Insert a subscriber, or reactivate the existing row for the address.
///
/// An existing token is kept so links in earlier emails stay valid.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert(
    pool: &PgPool,
    email: &Email,
    source: &str,
) -> Result<Subscriber, RepositoryError> {
    let subscriber = sqlx::query_as::<_, Subscriber>(
        r"
        INSERT INTO subscribers (id, email, is_active, unsubscribe_token, source)
        VALUES ($1, $2, TRUE, $3, $4)
        ON CONFLICT (email) DO UPDATE SET
            is_active = TRUE,
            unsubscribe_token = COALESCE(subscribers.unsubscribe_token, EXCLUDED.unsubscribe_token),
            updated_at = NOW()
        RETURNING id, email, is_active, unsubscribe_token, source, created_at, updated_at
        ",
    )
    .bind(SubscriberId::new())
    .bind(email)
    .bind(generate_unsubscribe_token())
    .bind(source)
    .fetch_one(pool)
    .await?;

    Ok(subscriber)
}

/// Deactivate the subscriber holding `token` and null the token.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn unsubscribe(pool: &PgPool, token: &str) -> Result<Option<Subscriber>, RepositoryError> {
    let subscriber = sqlx::query_as::<_, Subscriber>(
        r"
        UPDATE subscribers
        SET is_active = FALSE, unsubscribe_token = NULL, updated_at = NOW()
        WHERE unsubscribe_token = $1
        RETURNING id, email, is_active, unsubscribe_token, source, created_at, updated_at
        ",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(subscriber)
}

/// Subscriber counts for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct SubscriberStats {
    pub total: i64,
    pub active: i64,
}

/// Count all and active subscribers.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn stats(pool: &PgPool) -> Result<SubscriberStats, RepositoryError> {
    let stats = sqlx::query_as::<_, SubscriberStats>(
        r"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE is_active) AS active
        FROM subscribers
        ",
    )
    .fetch_one(pool)
    .await?;

    Ok(stats)
}
