//! Waitlist inspection and manual entry.

use lullwave_core::Email;
use lullwave_functions::db::subscribers;

use super::{CommandError, connect};

/// Log total and active subscriber counts.
pub async fn stats() -> Result<(), CommandError> {
    let pool = connect().await?;
    let stats = subscribers::stats(&pool).await?;
    tracing::info!(
        "Subscribers: {} total, {} active, {} unsubscribed",
        stats.total,
        stats.active,
        stats.total - stats.active
    );
    Ok(())
}

/// Add or reactivate a subscriber. No welcome email is sent.
pub async fn add(email: &str, source: &str) -> Result<(), CommandError> {
    let email = Email::parse(email).map_err(|e| CommandError::InvalidEmail(e.to_string()))?;
    let pool = connect().await?;
    let subscriber = subscribers::upsert(&pool, &email, source).await?;
    tracing::info!(
        "Subscriber {} saved (id {}, active: {})",
        subscriber.email,
        subscriber.id,
        subscriber.is_active
    );
    Ok(())
}
