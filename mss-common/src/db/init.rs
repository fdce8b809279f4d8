//! Database initialization
//!
//! Creates the database on first run, applies the schema, migrations and
//! default settings, then opens the working pool with the configured busy
//! timeout applied to every connection.

use crate::db::settings::{self, DATABASE_LOCK_RETRY_MS};
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Busy timeout used while bootstrapping, before settings are readable
const BOOTSTRAP_BUSY_TIMEOUT_MS: u64 = 5000;

/// Fallback for `database_lock_retry_ms`
const DEFAULT_LOCK_RETRY_MS: u64 = 1000;

/// Maximum pooled connections for the working pool
const MAX_CONNECTIONS: u32 = 20;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let bootstrap = open_pool(db_path, 1, BOOTSTRAP_BUSY_TIMEOUT_MS).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Idempotent - safe to call on every startup
    create_schema_version_table(&bootstrap).await?;
    settings::create_settings_table(&bootstrap).await?;
    create_placeholders_table(&bootstrap).await?;

    crate::db::migrations::run_migrations(&bootstrap).await?;
    settings::init_default_settings(&bootstrap).await?;

    let busy_timeout_ms =
        settings::get_setting_u64(&bootstrap, DATABASE_LOCK_RETRY_MS, DEFAULT_LOCK_RETRY_MS)
            .await?;
    bootstrap.close().await;

    let pool = open_pool(db_path, MAX_CONNECTIONS, busy_timeout_ms).await?;
    info!("Database busy timeout set to {} ms", busy_timeout_ms);

    Ok(pool)
}

/// Open a pool with WAL, foreign keys and the given busy timeout
///
/// Connection options apply to every connection the pool opens, unlike a
/// one-off `PRAGMA` executed against the pool.
async fn open_pool(db_path: &Path, max_connections: u32, busy_timeout_ms: u64) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the placeholders table
///
/// One row per admitted placeholder. Indexes (including the partial unique
/// index that admits at most one `pending` row per `dedup_key`) are created
/// by the migrations so that databases written by older builds get them too.
pub async fn create_placeholders_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS placeholders (
            id TEXT PRIMARY KEY,
            dedup_key TEXT NOT NULL,
            generation INTEGER NOT NULL DEFAULT 1 CHECK (generation >= 1),
            tenant_id INTEGER NOT NULL,
            subject_id INTEGER,
            task_id INTEGER,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'finalized', 'abandoned')),
            payload TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            finalized_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
