//! Placeholder admission
//!
//! Guarantees at most one pending placeholder per dedup key, under concurrent
//! requests and across processes sharing a database.
//!
//! - [`key`]: canonical dedup key from the submission context
//! - [`store`]: the [`AdmissionStore`] trait, with SQLite and in-memory backends
//! - [`singleflight`]: in-process coalescing of concurrent identical requests
//! - [`service`]: [`PlaceholderService::get_or_create`] and lifecycle operations
//! - [`sweeper`]: background abandonment of stale pending placeholders

pub mod error;
pub mod key;
pub mod memory;
pub mod service;
pub mod singleflight;
pub mod sqlite;
pub mod store;
pub mod sweeper;
pub mod types;

pub use error::{AdmissionError, AdmissionResult};
pub use key::{derive_key, DedupKey, SubmissionContext};
pub use memory::MemoryAdmissionStore;
pub use service::{Admission, AdmissionOutcome, PlaceholderService};
pub use singleflight::{Flight, FlightAborted, FlightStats, SingleFlight};
pub use sqlite::SqliteAdmissionStore;
pub use store::{AdmissionStore, Insertion, Transitioned};
pub use sweeper::{spawn_sweeper, sweep_once, SweeperConfig};
pub use types::{PlaceholderId, PlaceholderRecord, PlaceholderStatus};
