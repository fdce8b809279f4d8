//! Stale placeholder sweeper
//!
//! A pending placeholder whose intake flow never finishes would hold its key
//! forever. The sweeper periodically abandons pending placeholders older than
//! `placeholder_abandon_after_secs`, freeing their keys for a new generation.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::AdmissionResult;
use super::service::PlaceholderService;

/// Sweeper timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps; zero disables the sweeper
    pub interval: Duration,
    /// Minimum age of a pending placeholder before it is abandoned
    pub abandon_after: Duration,
}

impl SweeperConfig {
    pub fn from_secs(interval_secs: u64, abandon_after_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            abandon_after: Duration::from_secs(abandon_after_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// Run one sweep, returning the number of placeholders abandoned.
pub async fn sweep_once(
    service: &PlaceholderService,
    abandon_after: Duration,
) -> AdmissionResult<usize> {
    let cutoff = mss_common::time::cutoff_before(mss_common::time::now(), abandon_after.as_secs());
    let abandoned = service.abandon_stale(cutoff).await?;

    if abandoned.is_empty() {
        debug!("Sweep found no stale placeholders");
    } else {
        info!(count = abandoned.len(), %cutoff, "Abandoned stale placeholders");
    }
    Ok(abandoned.len())
}

/// Start the background sweeper.
///
/// Returns `None` when the configured interval is zero. The task exits when
/// `cancel_token` is cancelled. Sweep failures are logged and retried on the
/// next tick.
pub fn spawn_sweeper(
    service: Arc<PlaceholderService>,
    config: SweeperConfig,
    cancel_token: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !config.is_enabled() {
        info!("Stale placeholder sweeper disabled");
        return None;
    }

    info!(
        interval_secs = config.interval.as_secs(),
        abandon_after_secs = config.abandon_after.as_secs(),
        "Starting stale placeholder sweeper"
    );

    Some(tokio::spawn(async move {
        let mut tick = interval(config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Stale placeholder sweeper stopping");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = sweep_once(&service, config.abandon_after).await {
                        warn!("Stale placeholder sweep failed: {}", e);
                    }
                }
            }
        }
    }))
}
