//! Placeholder lifecycle events
//!
//! Provides the shared event definitions and EventBus for the intake services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Why a placeholder was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// Explicit abandon request from the intake flow
    Requested,
    /// Pending longer than the configured abandon age
    Stale,
}

/// Placeholder lifecycle event
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AdmissionEvent {
    /// A new pending placeholder was admitted
    PlaceholderCreated {
        placeholder_id: Uuid,
        tenant_id: i64,
        dedup_key: String,
        generation: u32,
        timestamp: DateTime<Utc>,
    },

    /// A request resolved to an existing pending placeholder
    PlaceholderReused {
        placeholder_id: Uuid,
        tenant_id: i64,
        dedup_key: String,
        timestamp: DateTime<Utc>,
    },

    /// Placeholder reached `finalized` (e.g. scoring result attached)
    PlaceholderFinalized {
        placeholder_id: Uuid,
        tenant_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Placeholder reached `abandoned`
    PlaceholderAbandoned {
        placeholder_id: Uuid,
        tenant_id: i64,
        reason: AbandonReason,
        timestamp: DateTime<Utc>,
    },
}

impl AdmissionEvent {
    /// Tenant the event belongs to
    pub fn tenant_id(&self) -> i64 {
        match self {
            AdmissionEvent::PlaceholderCreated { tenant_id, .. }
            | AdmissionEvent::PlaceholderReused { tenant_id, .. }
            | AdmissionEvent::PlaceholderFinalized { tenant_id, .. }
            | AdmissionEvent::PlaceholderAbandoned { tenant_id, .. } => *tenant_id,
        }
    }

    /// Placeholder the event refers to
    pub fn placeholder_id(&self) -> Uuid {
        match self {
            AdmissionEvent::PlaceholderCreated { placeholder_id, .. }
            | AdmissionEvent::PlaceholderReused { placeholder_id, .. }
            | AdmissionEvent::PlaceholderFinalized { placeholder_id, .. }
            | AdmissionEvent::PlaceholderAbandoned { placeholder_id, .. } => *placeholder_id,
        }
    }

    /// Event type name (SSE `event:` field)
    pub fn event_type(&self) -> &'static str {
        match self {
            AdmissionEvent::PlaceholderCreated { .. } => "PlaceholderCreated",
            AdmissionEvent::PlaceholderReused { .. } => "PlaceholderReused",
            AdmissionEvent::PlaceholderFinalized { .. } => "PlaceholderFinalized",
            AdmissionEvent::PlaceholderAbandoned { .. } => "PlaceholderAbandoned",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally: publishing never blocks on slow
/// subscribers, and lagging subscribers observe `RecvError::Lagged`.
///
/// # Examples
///
/// ```
/// use mss_common::events::{AdmissionEvent, EventBus};
///
/// let event_bus = EventBus::new(16);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(AdmissionEvent::PlaceholderFinalized {
///     placeholder_id: uuid::Uuid::new_v4(),
///     tenant_id: 1,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AdmissionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AdmissionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AdmissionEvent,
    ) -> Result<usize, broadcast::error::SendError<AdmissionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AdmissionEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            debug!(event_type = event.event_type(), "No subscribers for event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
