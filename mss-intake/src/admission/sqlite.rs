//! SQLite admission store
//!
//! Relies on `idx_placeholders_pending_key`, a unique index on `dedup_key`
//! restricted to `status = 'pending'` (created by the mss-common migrations).
//! Admission is a single `INSERT .. ON CONFLICT DO NOTHING RETURNING`
//! statement, so concurrent writers on any number of connections or
//! processes admit at most one pending row per key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mss_common::time::{parse_rfc3339, to_db_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use super::error::{AdmissionError, AdmissionResult};
use super::key::{DedupKey, SubmissionContext};
use super::store::{AdmissionStore, Insertion, Transitioned};
use super::types::{plan_transition, PlaceholderId, PlaceholderRecord, PlaceholderStatus, Transition};

/// Admission attempts before giving up on a key whose pending record keeps
/// reaching a terminal state between the insert and the lookup.
const MAX_INSERT_ATTEMPTS: usize = 3;

const RECORD_COLUMNS: &str = "id, dedup_key, generation, tenant_id, subject_id, task_id, \
                              status, payload, created_at, finalized_at";

/// SQLite implementation of [`AdmissionStore`].
#[derive(Debug, Clone)]
pub struct SqliteAdmissionStore {
    pool: SqlitePool,
}

impl SqliteAdmissionStore {
    /// Wrap a pool opened by `mss_common::db::init_database`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn transition(
        &self,
        id: PlaceholderId,
        target: PlaceholderStatus,
    ) -> AdmissionResult<Transitioned> {
        let sql = format!(
            "UPDATE placeholders SET status = ?, finalized_at = ? \
             WHERE id = ? AND status = 'pending' RETURNING {}",
            RECORD_COLUMNS
        );
        let updated = sqlx::query(&sql)
            .bind(target.as_str())
            .bind(to_db_timestamp(Utc::now()))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = updated {
            return Ok(Transitioned {
                record: record_from_row(&row)?,
                changed: true,
            });
        }

        // Not pending (or absent): decide between no-op and rejection.
        let record = self.get(id).await?;
        match plan_transition(id, record.status, target)? {
            Transition::AlreadyDone => Ok(Transitioned {
                record,
                changed: false,
            }),
            Transition::Apply => Err(AdmissionError::Internal(format!(
                "placeholder {} reported pending after conditional update missed it",
                id
            ))),
        }
    }
}

#[async_trait]
impl AdmissionStore for SqliteAdmissionStore {
    async fn try_insert(
        &self,
        key: &DedupKey,
        context: &SubmissionContext,
        payload: &serde_json::Value,
    ) -> AdmissionResult<Insertion> {
        let payload_text = serde_json::to_string(payload)
            .map_err(|e| AdmissionError::Internal(format!("Failed to serialize payload: {}", e)))?;

        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            let id = PlaceholderId::generate();

            // The WHERE clause on the SELECT is required by SQLite to parse
            // an upsert on INSERT .. SELECT; MAX() still yields one row.
            let inserted: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO placeholders (
                    id, dedup_key, generation, tenant_id, subject_id, task_id,
                    status, payload, created_at
                )
                SELECT ?, ?, COALESCE(MAX(generation), 0) + 1, ?, ?, ?, 'pending', ?, ?
                FROM placeholders
                WHERE dedup_key = ?
                ON CONFLICT (dedup_key) WHERE status = 'pending' DO NOTHING
                RETURNING generation
                "#,
            )
            .bind(id.to_string())
            .bind(key.as_str())
            .bind(context.tenant_id())
            .bind(context.subject_id())
            .bind(context.task_id())
            .bind(&payload_text)
            .bind(to_db_timestamp(Utc::now()))
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

            if let Some(generation) = inserted {
                debug!(key = %key, %id, generation, "Inserted pending placeholder");
                return Ok(Insertion::Inserted {
                    id,
                    generation: to_generation(generation)?,
                });
            }

            // The insert was rejected by the pending-key index: report the
            // holder. This read never gates a write.
            let existing: Option<(String, i64)> = sqlx::query_as(
                "SELECT id, generation FROM placeholders WHERE dedup_key = ? AND status = 'pending'",
            )
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

            if let Some((existing, generation)) = existing {
                debug!(key = %key, %existing, "Pending placeholder already admitted");
                return Ok(Insertion::Conflict {
                    existing: parse_id(&existing)?,
                    generation: to_generation(generation)?,
                });
            }

            warn!(
                key = %key,
                attempt,
                "Pending placeholder became terminal between insert and lookup, retrying"
            );
        }

        Err(AdmissionError::Internal(format!(
            "admission for key {} did not settle after {} attempts",
            key, MAX_INSERT_ATTEMPTS
        )))
    }

    async fn finalize(&self, id: PlaceholderId) -> AdmissionResult<Transitioned> {
        self.transition(id, PlaceholderStatus::Finalized).await
    }

    async fn abandon(&self, id: PlaceholderId) -> AdmissionResult<Transitioned> {
        self.transition(id, PlaceholderStatus::Abandoned).await
    }

    async fn abandon_stale(
        &self,
        created_before: DateTime<Utc>,
    ) -> AdmissionResult<Vec<PlaceholderRecord>> {
        let sql = format!(
            "UPDATE placeholders SET status = 'abandoned', finalized_at = ? \
             WHERE status = 'pending' AND created_at < ? RETURNING {}",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_db_timestamp(Utc::now()))
            .bind(to_db_timestamp(created_before))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn get(&self, id: PlaceholderId) -> AdmissionResult<PlaceholderRecord> {
        let sql = format!("SELECT {} FROM placeholders WHERE id = ?", RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(AdmissionError::NotFound(id)),
        }
    }

    async fn history(&self, key: &DedupKey) -> AdmissionResult<Vec<PlaceholderRecord>> {
        let sql = format!(
            "SELECT {} FROM placeholders WHERE dedup_key = ? ORDER BY generation, created_at",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> AdmissionResult<PlaceholderRecord> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let payload: String = row.try_get("payload")?;
    let created_at: String = row.try_get("created_at")?;
    let finalized_at: Option<String> = row.try_get("finalized_at")?;

    let context = SubmissionContext::new(
        row.try_get("tenant_id")?,
        row.try_get("subject_id")?,
        row.try_get("task_id")?,
    )
    .map_err(|e| AdmissionError::Storage(format!("Stored context for {} is invalid: {}", id, e)))?;

    Ok(PlaceholderRecord {
        id: parse_id(&id)?,
        key: DedupKey::from_stored(row.try_get("dedup_key")?),
        generation: to_generation(row.try_get("generation")?)?,
        status: status.parse()?,
        context,
        payload: serde_json::from_str(&payload)
            .map_err(|e| AdmissionError::Storage(format!("Failed to parse payload of {}: {}", id, e)))?,
        created_at: parse_timestamp(&created_at)?,
        finalized_at: finalized_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_id(value: &str) -> AdmissionResult<PlaceholderId> {
    value
        .parse()
        .map_err(|e| AdmissionError::Storage(format!("Invalid placeholder id '{}': {}", value, e)))
}

fn parse_timestamp(value: &str) -> AdmissionResult<DateTime<Utc>> {
    parse_rfc3339(value)
        .map_err(|e| AdmissionError::Storage(format!("Invalid timestamp '{}': {}", value, e)))
}

fn to_generation(value: i64) -> AdmissionResult<u32> {
    u32::try_from(value)
        .map_err(|_| AdmissionError::Storage(format!("Generation out of range: {}", value)))
}
