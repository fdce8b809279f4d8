//! Runtime settings stored in the `settings` table
//!
//! Values are TEXT; typed accessors fall back to the supplied default when a
//! key is missing, NULL, or unparsable.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Listen address used when neither CLI nor TOML provides one
pub const INTAKE_BIND_ADDR: &str = "intake_bind_addr";
/// SQLite busy timeout applied to every pooled connection
pub const DATABASE_LOCK_RETRY_MS: &str = "database_lock_retry_ms";
/// Caller-side retry budget for transient storage failures
pub const INTAKE_MAX_RETRY_WAIT_MS: &str = "intake_max_retry_wait_ms";
/// Age after which pending placeholders are abandoned by the sweeper
pub const PLACEHOLDER_ABANDON_AFTER_SECS: &str = "placeholder_abandon_after_secs";
/// Sweeper period (0 disables the sweeper)
pub const PLACEHOLDER_SWEEP_INTERVAL_SECS: &str = "placeholder_sweep_interval_secs";
/// Broadcast buffer size for lifecycle events
pub const EVENT_BUS_CAPACITY: &str = "event_bus_capacity";

/// Default values written on first run
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    (INTAKE_BIND_ADDR, crate::config::DEFAULT_BIND_ADDR),
    (DATABASE_LOCK_RETRY_MS, "1000"),
    (INTAKE_MAX_RETRY_WAIT_MS, "5000"),
    (PLACEHOLDER_ABANDON_AFTER_SECS, "3600"),
    (PLACEHOLDER_SWEEP_INTERVAL_SECS, "300"),
    (EVENT_BUS_CAPACITY, "256"),
];

/// Create the settings table
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure every default setting exists and none is NULL
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, default_value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, default_value).await?;
    }
    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// Missing keys are created; keys holding NULL are reset to the default.
/// Existing non-NULL values are left alone. A single upsert statement, so
/// concurrent initializers cannot race each other.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        WHERE settings.value IS NULL
        "#,
    )
    .bind(key)
    .bind(default_value)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
    }
    Ok(())
}

/// Read a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Read a setting as u64, falling back to `default`
pub async fn get_setting_u64(pool: &SqlitePool, key: &str, default: u64) -> Result<u64> {
    match get_setting(pool, key).await? {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!("Setting '{}' has non-numeric value '{}', using {}", key, raw, default);
                Ok(default)
            }
        },
        None => Ok(default),
    }
}

/// Write a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
