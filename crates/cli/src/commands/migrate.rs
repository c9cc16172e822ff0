//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! lw-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `FUNCTIONS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! Migrations live in `crates/functions/migrations/`.

use super::{CommandError, connect};

/// Run functions database migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running functions migrations...");
    sqlx::migrate!("../functions/migrations").run(&pool).await?;

    tracing::info!("Functions migrations complete!");
    Ok(())
}
