//! In-memory admission store
//!
//! For tests and single-process deployments without a database. Per-key
//! atomicity comes from DashMap's entry API: the key's shard lock is held
//! while the pending slot is checked and filled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::{AdmissionError, AdmissionResult};
use super::key::{DedupKey, SubmissionContext};
use super::store::{AdmissionStore, Insertion, Transitioned};
use super::types::{plan_transition, PlaceholderId, PlaceholderRecord, PlaceholderStatus, Transition};

#[derive(Debug, Default)]
struct KeyState {
    pending: Option<PlaceholderId>,
    last_generation: u32,
}

/// DashMap-backed implementation of [`AdmissionStore`].
#[derive(Debug, Default)]
pub struct MemoryAdmissionStore {
    keys: DashMap<DedupKey, KeyState>,
    records: DashMap<PlaceholderId, PlaceholderRecord>,
    insert_delay: Option<Duration>,
    insert_calls: AtomicUsize,
}

impl MemoryAdmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Sleep before every insert, simulating a slow store.
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    /// Number of `try_insert` calls that reached the store.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Total records across all keys and statuses.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn transition(
        &self,
        id: PlaceholderId,
        target: PlaceholderStatus,
    ) -> AdmissionResult<Transitioned> {
        let key = self
            .records
            .get(&id)
            .map(|record| record.key.clone())
            .ok_or(AdmissionError::NotFound(id))?;

        // Lock order: key state, then record (same as try_insert).
        let mut state = self.keys.entry(key).or_default();
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(AdmissionError::NotFound(id))?;

        let changed = plan_transition(id, record.status, target)? == Transition::Apply;
        if changed {
            record.status = target;
            record.finalized_at = Some(Utc::now());
            if state.pending == Some(id) {
                state.pending = None;
            }
        }

        Ok(Transitioned {
            record: record.clone(),
            changed,
        })
    }
}

#[async_trait]
impl AdmissionStore for MemoryAdmissionStore {
    async fn try_insert(
        &self,
        key: &DedupKey,
        context: &SubmissionContext,
        payload: &serde_json::Value,
    ) -> AdmissionResult<Insertion> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.keys.entry(key.clone()).or_default();

        if let Some(existing) = state.pending {
            return Ok(Insertion::Conflict {
                existing,
                generation: state.last_generation,
            });
        }

        let id = PlaceholderId::generate();
        let generation = state.last_generation + 1;
        self.records.insert(
            id,
            PlaceholderRecord {
                id,
                key: key.clone(),
                generation,
                status: PlaceholderStatus::Pending,
                context: context.clone(),
                payload: payload.clone(),
                created_at: Utc::now(),
                finalized_at: None,
            },
        );
        state.pending = Some(id);
        state.last_generation = generation;

        Ok(Insertion::Inserted { id, generation })
    }

    async fn finalize(&self, id: PlaceholderId) -> AdmissionResult<Transitioned> {
        self.transition(id, PlaceholderStatus::Finalized)
    }

    async fn abandon(&self, id: PlaceholderId) -> AdmissionResult<Transitioned> {
        self.transition(id, PlaceholderStatus::Abandoned)
    }

    async fn abandon_stale(
        &self,
        created_before: DateTime<Utc>,
    ) -> AdmissionResult<Vec<PlaceholderRecord>> {
        let stale: Vec<PlaceholderId> = self
            .records
            .iter()
            .filter(|record| {
                record.status == PlaceholderStatus::Pending && record.created_at < created_before
            })
            .map(|record| record.id)
            .collect();

        let mut abandoned = Vec::with_capacity(stale.len());
        for id in stale {
            // A record finalized since the scan is skipped, not an error.
            match self.transition(id, PlaceholderStatus::Abandoned) {
                Ok(Transitioned {
                    record,
                    changed: true,
                }) => abandoned.push(record),
                Ok(_) => {}
                Err(AdmissionError::InvalidTransition { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(abandoned)
    }

    async fn get(&self, id: PlaceholderId) -> AdmissionResult<PlaceholderRecord> {
        self.records
            .get(&id)
            .map(|record| record.value().clone())
            .ok_or(AdmissionError::NotFound(id))
    }

    async fn history(&self, key: &DedupKey) -> AdmissionResult<Vec<PlaceholderRecord>> {
        let mut records: Vec<PlaceholderRecord> = self
            .records
            .iter()
            .filter(|record| &record.key == key)
            .map(|record| record.value().clone())
            .collect();
        records.sort_by_key(|record| record.generation);
        Ok(records)
    }
}
