//! Placeholder service
//!
//! Entry point for the intake flow: derive the key, join or lead the
//! in-process flight for it, and let the store's atomic insert decide
//! between a new placeholder and the existing pending one.

use chrono::{DateTime, Utc};
use mss_common::events::{AbandonReason, AdmissionEvent, EventBus};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{AdmissionError, AdmissionResult};
use super::key::{derive_key, DedupKey, SubmissionContext};
use super::singleflight::{FlightStats, SingleFlight};
use super::store::{AdmissionStore, Insertion};
use super::types::{PlaceholderId, PlaceholderRecord};

/// Whether `get_or_create` made a new placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionOutcome {
    Created,
    Reused,
}

/// Placeholder id handed back to the intake flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub id: PlaceholderId,
    pub generation: u32,
    pub outcome: AdmissionOutcome,
}

/// Single-flight, idempotent placeholder creator
pub struct PlaceholderService {
    store: Arc<dyn AdmissionStore>,
    flights: SingleFlight<DedupKey, Insertion, AdmissionError>,
    event_bus: EventBus,
}

impl PlaceholderService {
    pub fn new(store: Arc<dyn AdmissionStore>, event_bus: EventBus) -> Self {
        Self {
            store,
            flights: SingleFlight::new(),
            event_bus,
        }
    }

    /// Resolve `context` to its pending placeholder, creating one if none
    /// exists.
    ///
    /// Every concurrent caller with the same context gets the same id. Only
    /// one of them sees [`AdmissionOutcome::Created`]. Errors (including
    /// `StorageUnavailable`) are returned as-is; retrying is up to the
    /// caller.
    ///
    /// `payload` is stored only when this call creates the placeholder.
    pub async fn get_or_create(
        &self,
        context: &SubmissionContext,
        payload: serde_json::Value,
    ) -> AdmissionResult<Admission> {
        let key = derive_key(context);

        let store = Arc::clone(&self.store);
        let flight_key = key.clone();
        let flight_context = context.clone();
        let flight = self
            .flights
            .run_exclusive(key.clone(), move || async move {
                store
                    .try_insert(&flight_key, &flight_context, &payload)
                    .await
            })
            .await?;

        let admission = match flight.value {
            Insertion::Inserted { id, generation } if !flight.shared => {
                info!(key = %key, %id, generation, "Created placeholder");
                self.event_bus.emit_lossy(AdmissionEvent::PlaceholderCreated {
                    placeholder_id: id.as_uuid(),
                    tenant_id: context.tenant_id(),
                    dedup_key: key.to_string(),
                    generation,
                    timestamp: Utc::now(),
                });
                Admission {
                    id,
                    generation,
                    outcome: AdmissionOutcome::Created,
                }
            }
            insertion => {
                debug!(key = %key, id = %insertion.id(), shared = flight.shared, "Reused placeholder");
                self.event_bus.emit_lossy(AdmissionEvent::PlaceholderReused {
                    placeholder_id: insertion.id().as_uuid(),
                    tenant_id: context.tenant_id(),
                    dedup_key: key.to_string(),
                    timestamp: Utc::now(),
                });
                Admission {
                    id: insertion.id(),
                    generation: insertion.generation(),
                    outcome: AdmissionOutcome::Reused,
                }
            }
        };

        Ok(admission)
    }

    /// Mark a placeholder finalized. Repeating the call is a no-op.
    pub async fn finalize(&self, id: PlaceholderId) -> AdmissionResult<PlaceholderRecord> {
        let transitioned = self.store.finalize(id).await?;
        if transitioned.changed {
            info!(%id, "Finalized placeholder");
            self.event_bus.emit_lossy(AdmissionEvent::PlaceholderFinalized {
                placeholder_id: id.as_uuid(),
                tenant_id: transitioned.record.context.tenant_id(),
                timestamp: Utc::now(),
            });
        }
        Ok(transitioned.record)
    }

    /// Mark a placeholder abandoned, freeing its key. Repeating the call is a
    /// no-op.
    pub async fn abandon(&self, id: PlaceholderId) -> AdmissionResult<PlaceholderRecord> {
        let transitioned = self.store.abandon(id).await?;
        if transitioned.changed {
            info!(%id, "Abandoned placeholder");
            self.emit_abandoned(&transitioned.record, AbandonReason::Requested);
        }
        Ok(transitioned.record)
    }

    /// Abandon every pending placeholder created before `created_before`.
    pub async fn abandon_stale(
        &self,
        created_before: DateTime<Utc>,
    ) -> AdmissionResult<Vec<PlaceholderRecord>> {
        let abandoned = self.store.abandon_stale(created_before).await?;
        for record in &abandoned {
            self.emit_abandoned(record, AbandonReason::Stale);
        }
        Ok(abandoned)
    }

    pub async fn get(&self, id: PlaceholderId) -> AdmissionResult<PlaceholderRecord> {
        self.store.get(id).await
    }

    /// All generations recorded for a context, oldest first.
    pub async fn history(
        &self,
        context: &SubmissionContext,
    ) -> AdmissionResult<Vec<PlaceholderRecord>> {
        self.store.history(&derive_key(context)).await
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    /// Keys with a store insert currently in flight in this process.
    pub fn in_flight_count(&self) -> usize {
        self.flights.in_flight_count()
    }

    pub fn flight_stats(&self) -> FlightStats {
        self.flights.stats()
    }

    fn emit_abandoned(&self, record: &PlaceholderRecord, reason: AbandonReason) {
        self.event_bus.emit_lossy(AdmissionEvent::PlaceholderAbandoned {
            placeholder_id: record.id.as_uuid(),
            tenant_id: record.context.tenant_id(),
            reason,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::memory::MemoryAdmissionStore;
    use serde_json::json;

    fn service() -> (PlaceholderService, Arc<MemoryAdmissionStore>) {
        let store = MemoryAdmissionStore::new_shared();
        let service = PlaceholderService::new(store.clone(), EventBus::new(16));
        (service, store)
    }

    fn context(subject: i64) -> SubmissionContext {
        SubmissionContext::new(1, Some(subject), Some(7)).unwrap()
    }

    #[tokio::test]
    async fn test_sequential_calls_reuse_pending() {
        let (service, store) = service();

        let first = service.get_or_create(&context(123), json!({})).await.unwrap();
        let second = service.get_or_create(&context(123), json!({})).await.unwrap();

        assert_eq!(first.outcome, AdmissionOutcome::Created);
        assert_eq!(second.outcome, AdmissionOutcome::Reused);
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_events_emitted_once_per_change() {
        let (service, _store) = service();
        let mut rx = service.events().subscribe();

        let admission = service.get_or_create(&context(1), json!({})).await.unwrap();
        service.get_or_create(&context(1), json!({})).await.unwrap();
        service.finalize(admission.id).await.unwrap();
        service.finalize(admission.id).await.unwrap();

        let types: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.event_type())
            .collect();
        assert_eq!(
            types,
            vec!["PlaceholderCreated", "PlaceholderReused", "PlaceholderFinalized"]
        );
    }

    #[tokio::test]
    async fn test_abandon_frees_key() {
        let (service, _store) = service();

        let first = service.get_or_create(&context(5), json!({})).await.unwrap();
        let record = service.abandon(first.id).await.unwrap();
        assert_eq!(record.status, crate::admission::PlaceholderStatus::Abandoned);

        let second = service.get_or_create(&context(5), json!({})).await.unwrap();
        assert_eq!(second.outcome, AdmissionOutcome::Created);
        assert_eq!(second.generation, 2);

        let err = service.finalize(first.id).await.unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidTransition { .. }));
        assert_eq!(service.history(&context(5)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_abandon_stale_emits_stale_reason() {
        let (service, _store) = service();
        let admission = service.get_or_create(&context(9), json!({})).await.unwrap();
        let mut rx = service.events().subscribe();

        let swept = service
            .abandon_stale(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, admission.id);
        match rx.try_recv().unwrap() {
            AdmissionEvent::PlaceholderAbandoned { reason, .. } => {
                assert_eq!(reason, AbandonReason::Stale)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
