//! Database schema migrations
//!
//! Versioned schema migrations, tracked in the `schema_version` table. Every
//! migration is idempotent so a partially applied upgrade can simply be re-run.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - they must remain stable for databases upgrading from older builds
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use `IF NOT EXISTS`** - or check `sqlite_master` / `pragma_table_info` first

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: at most one pending placeholder per dedup key
///
/// Databases written by the old lookup-then-insert path may already hold
/// several `pending` rows for one key. All but the oldest are abandoned so the
/// partial unique index can be created.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: unique pending placeholder per dedup key");

    let abandoned = sqlx::query(
        r#"
        UPDATE placeholders
        SET status = 'abandoned',
            finalized_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE status = 'pending'
          AND id NOT IN (
              SELECT id FROM (
                  SELECT id,
                         ROW_NUMBER() OVER (
                             PARTITION BY dedup_key
                             ORDER BY created_at, id
                         ) AS rn
                  FROM placeholders
                  WHERE status = 'pending'
              )
              WHERE rn = 1
          )
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    if abandoned > 0 {
        warn!("  Abandoned {} duplicate pending placeholders", abandoned);
    }

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_placeholders_pending_key
        ON placeholders (dedup_key)
        WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await?;

    info!("  ✓ Created idx_placeholders_pending_key");
    Ok(())
}

/// Migration v2: indexes for history lookups, the stale sweeper and tenant scans
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: placeholder lookup indexes");

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_placeholders_key_generation ON placeholders (dedup_key, generation)",
        "CREATE INDEX IF NOT EXISTS idx_placeholders_status_created ON placeholders (status, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_placeholders_tenant ON placeholders (tenant_id)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("  ✓ Created placeholder lookup indexes");
    Ok(())
}
