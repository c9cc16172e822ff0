//! `app_settings` management.

use lullwave_functions::db::settings;

use super::{CommandError, connect, mask};

/// Print a setting; values are masked since most settings are keys.
pub async fn get(key: &str) -> Result<(), CommandError> {
    let pool = connect().await?;
    match settings::get_setting(&pool, key).await? {
        Some(value) => tracing::info!("{key} = {}", mask(&value)),
        None => tracing::warn!("{key} is not set"),
    }
    Ok(())
}

pub async fn set(key: &str, value: &str) -> Result<(), CommandError> {
    let pool = connect().await?;
    settings::set_setting(&pool, key, value).await?;
    tracing::info!("Setting {key} saved");
    Ok(())
}

pub async fn delete(key: &str) -> Result<(), CommandError> {
    let pool = connect().await?;
    if settings::delete_setting(&pool, key).await? {
        tracing::info!("Setting {key} deleted");
    } else {
        tracing::warn!("{key} was not set");
    }
    Ok(())
}
