//! In-process single-flight coordination
//!
//! Concurrent callers with the same key join one in-flight operation instead
//! of each running their own. The first caller (leader) starts the operation;
//! everyone arriving while it runs (followers) waits for its outcome.
//!
//! - The operation runs on its own task, so a leader whose caller is
//!   cancelled does not abort the work followers are waiting on.
//! - The in-flight entry is removed before the outcome is published. Callers
//!   arriving after completion start a new flight.
//! - Only successes are shared. A failed flight hands its error to the leader
//!   alone; followers retry independently.
//! - A panicking operation is cleaned up by [`FlightGuard`]; its leader gets
//!   [`FlightAborted`] and its followers retry.
//!
//! This is a latency optimization. Correctness across processes comes from
//! the store's atomic insert, never from this map.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// The operation task ended without producing an outcome (it panicked or the
/// runtime is shutting down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightAborted;

/// A value plus whether it came from another caller's flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flight<T> {
    pub value: T,
    /// `false` for the leader, `true` for followers
    pub shared: bool,
}

/// Counters for observing coalescing behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlightStats {
    /// Flights started
    pub leaders: u64,
    /// Callers that joined an existing flight
    pub followers: u64,
    /// Followers whose flight failed and who went round again
    pub retries: u64,
}

type Outcome<T, E> = Option<Result<T, E>>;

struct Slot<T, E> {
    flight_id: u64,
    outcome: watch::Receiver<Outcome<T, E>>,
}

#[derive(Default)]
struct Counters {
    next_flight_id: AtomicU64,
    leaders: AtomicU64,
    followers: AtomicU64,
    retries: AtomicU64,
}

enum Role<T, E> {
    Leader {
        flight_id: u64,
        publish: watch::Sender<Outcome<T, E>>,
        outcome: watch::Receiver<Outcome<T, E>>,
    },
    Follower(watch::Receiver<Outcome<T, E>>),
}

/// Per-key single-flight coordinator.
///
/// Cheap to clone; clones share the same in-flight map.
pub struct SingleFlight<K, T, E>
where
    K: Hash + Eq,
{
    in_flight: Arc<DashMap<K, Slot<T, E>>>,
    counters: Arc<Counters>,
}

impl<K, T, E> Clone for SingleFlight<K, T, E>
where
    K: Hash + Eq,
{
    fn clone(&self) -> Self {
        Self {
            in_flight: Arc::clone(&self.in_flight),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<K, T, E> Default for SingleFlight<K, T, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<FlightAborted> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<FlightAborted> + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Run `operation` for `key`, or join the flight already running for it.
    ///
    /// `operation` is only invoked if this caller becomes the leader.
    pub async fn run_exclusive<F, Fut>(&self, key: K, operation: F) -> Result<Flight<T>, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        loop {
            match self.acquire(&key) {
                Role::Leader {
                    flight_id,
                    publish,
                    mut outcome,
                } => {
                    self.counters.leaders.fetch_add(1, Ordering::Relaxed);
                    let guard = FlightGuard {
                        in_flight: Arc::clone(&self.in_flight),
                        key: key.clone(),
                        flight_id,
                    };
                    let work = operation();
                    tokio::spawn(async move {
                        let result = work.await;
                        drop(guard);
                        publish.send_replace(Some(result));
                    });

                    return match wait_outcome(&mut outcome).await {
                        Some(result) => result.map(|value| Flight {
                            value,
                            shared: false,
                        }),
                        None => {
                            warn!("Single-flight operation ended without an outcome");
                            Err(E::from(FlightAborted))
                        }
                    };
                }
                Role::Follower(mut outcome) => {
                    self.counters.followers.fetch_add(1, Ordering::Relaxed);
                    if let Some(Ok(value)) = wait_outcome(&mut outcome).await {
                        return Ok(Flight {
                            value,
                            shared: true,
                        });
                    }
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    debug!("Joined flight did not succeed, retrying");
                }
            }
        }
    }

    /// Number of keys with an operation currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> FlightStats {
        FlightStats {
            leaders: self.counters.leaders.load(Ordering::Relaxed),
            followers: self.counters.followers.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
        }
    }

    /// Atomically join the running flight for `key` or register a new one.
    fn acquire(&self, key: &K) -> Role<T, E> {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().outcome.clone()),
            Entry::Vacant(entry) => {
                let flight_id = self.counters.next_flight_id.fetch_add(1, Ordering::Relaxed);
                let (publish, outcome) = watch::channel(None);
                entry.insert(Slot {
                    flight_id,
                    outcome: outcome.clone(),
                });
                Role::Leader {
                    flight_id,
                    publish,
                    outcome,
                }
            }
        }
    }
}

async fn wait_outcome<T: Clone, E: Clone>(
    outcome: &mut watch::Receiver<Outcome<T, E>>,
) -> Outcome<T, E> {
    match outcome.wait_for(Option::is_some).await {
        Ok(published) => (*published).clone(),
        Err(_) => None,
    }
}

/// Removes a flight's map entry when its task finishes or unwinds.
///
/// Only the entry registered by this flight is removed, never a newer flight
/// that reused the key.
struct FlightGuard<K, T, E>
where
    K: Hash + Eq,
{
    in_flight: Arc<DashMap<K, Slot<T, E>>>,
    key: K,
    flight_id: u64,
}

impl<K, T, E> Drop for FlightGuard<K, T, E>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        let flight_id = self.flight_id;
        self.in_flight
            .remove_if(&self.key, |_, slot| slot.flight_id == flight_id);
    }
}
