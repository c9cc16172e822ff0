//! Runtime settings stored in `app_settings`.

use sqlx::PgPool;

use super::RepositoryError;

/// Settings key holding the transactional email API key.
pub const EMAIL_API_KEY: &str = "email_api_key";

/// Get a setting value.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn get_setting(pool: &PgPool, key: &str) -> Result<Option<String>, RepositoryError> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM app_settings WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value)
}

/// Set a setting value, replacing any previous one.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn set_setting(pool: &PgPool, key: &str, value: &str) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO app_settings (key, value)
        VALUES ($1, $2)
        ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
        ",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a setting.
///
/// Returns whether a row was deleted.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn delete_setting(pool: &PgPool, key: &str) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM app_settings WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
