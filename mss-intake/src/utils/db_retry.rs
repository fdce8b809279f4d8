//! Storage Retry Logic
//!
//! Exponential backoff for transient storage failures
//! (`AdmissionError::StorageUnavailable`). The admission service itself never
//! retries; callers at the edge (HTTP handlers) opt in here, bounded by the
//! `intake_max_retry_wait_ms` setting.

use std::time::{Duration, Instant};

use crate::admission::AdmissionResult;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Retry an admission operation with exponential backoff until `max_wait_ms`
/// elapses.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error is transient:
///    a. If time elapsed < max_wait_ms: log WARN, backoff, retry
///    b. If time elapsed >= max_wait_ms: log ERROR, return the last error
/// 4. Any other error is returned immediately (no retry)
///
/// **Backoff Strategy:** 10ms initial, doubling, capped at 1000ms. The final
/// sleep is shortened so the budget is not overshot.
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> AdmissionResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AdmissionResult<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Storage operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Storage operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();
                let remaining = max_duration.saturating_sub(elapsed);

                if remaining.is_zero() {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Storage operation failed: max retry time exceeded"
                    );
                    return Err(err);
                }

                let sleep = Duration::from_millis(backoff_ms).min(remaining);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis(),
                    backoff_ms = sleep.as_millis(),
                    remaining_ms = remaining.as_millis(),
                    error = %err,
                    "Storage unavailable, will retry after backoff"
                );

                tokio::time::sleep(sleep).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
