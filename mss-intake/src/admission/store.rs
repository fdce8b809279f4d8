//! AdmissionStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::AdmissionResult;
use super::key::{DedupKey, SubmissionContext};
use super::types::{PlaceholderId, PlaceholderRecord};

/// Outcome of an atomic admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// A new pending record was created.
    Inserted { id: PlaceholderId, generation: u32 },
    /// A pending record already held the key; nothing was written.
    Conflict { existing: PlaceholderId, generation: u32 },
}

impl Insertion {
    pub fn id(&self) -> PlaceholderId {
        match self {
            Insertion::Inserted { id, .. } => *id,
            Insertion::Conflict { existing, .. } => *existing,
        }
    }

    pub fn generation(&self) -> u32 {
        match self {
            Insertion::Inserted { generation, .. } | Insertion::Conflict { generation, .. } => {
                *generation
            }
        }
    }
}

/// Result of a status change request.
#[derive(Debug, Clone, PartialEq)]
pub struct Transitioned {
    pub record: PlaceholderRecord,
    /// `false` when the record already had the requested status
    pub changed: bool,
}

/// Durable key -> placeholder mapping.
///
/// Implementations must admit at most one `pending` record per key using a
/// primitive that is atomic at the storage layer. A separate existence check
/// gating the insert is not acceptable: two connections can both observe
/// "absent" and both insert.
#[async_trait]
pub trait AdmissionStore: Send + Sync + 'static {
    /// Persist a new `pending` record for `key`, or report the one that
    /// already exists. Collision is `Ok(Insertion::Conflict)`, never an error.
    ///
    /// The new record's generation is one more than the highest generation
    /// previously stored for the key.
    async fn try_insert(
        &self,
        key: &DedupKey,
        context: &SubmissionContext,
        payload: &serde_json::Value,
    ) -> AdmissionResult<Insertion>;

    /// `pending -> finalized`. Idempotent on finalized records.
    async fn finalize(&self, id: PlaceholderId) -> AdmissionResult<Transitioned>;

    /// `pending -> abandoned`. Idempotent on abandoned records.
    async fn abandon(&self, id: PlaceholderId) -> AdmissionResult<Transitioned>;

    /// Abandon every pending record created before `created_before`.
    async fn abandon_stale(
        &self,
        created_before: DateTime<Utc>,
    ) -> AdmissionResult<Vec<PlaceholderRecord>>;

    async fn get(&self, id: PlaceholderId) -> AdmissionResult<PlaceholderRecord>;

    /// Every generation stored for `key`, oldest first.
    async fn history(&self, key: &DedupKey) -> AdmissionResult<Vec<PlaceholderRecord>>;
}
