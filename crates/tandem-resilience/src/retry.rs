//! Retry Engine
//!
//! Bounded retry loop with exponential backoff and symmetric jitter. An
//! operation runs up to `max_retries + 1` times; between attempts `k` and
//! `k + 1` the engine sleeps
//!
//! ```text
//! delay(k) = min(initial_delay * backoff_factor^k, max_delay)
//! ```
//!
//! with ±25% jitter applied when enabled. Backoff sleeps are ordinary
//! awaited futures, so cancelling the surrounding call cancels the timer.
//!
//! Whether a failure is worth retrying is decided by [`should_retry`]:
//! transient HTTP statuses from the configured set, transport failure
//! classes, and timeouts retry; client-protocol errors and an open circuit
//! never do.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use tandem_common::config::RetryConfig;
use tandem_common::protocol::{Result, TandemError};

/// Backoff delay before retry `attempt + 1` (0-indexed attempts).
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential = config.initial_delay_ms as f64 * config.backoff_factor.powi(attempt as i32);
    let capped = exponential.min(config.max_delay_ms as f64);

    let delayed = if config.jitter {
        let unit: f64 = rand::random();
        (capped + capped * 0.25 * (2.0 * unit - 1.0)).max(0.0)
    } else {
        capped
    };

    Duration::from_millis(delayed as u64)
}

/// Classify an error against the retry policy.
pub fn should_retry(err: &TandemError, config: &RetryConfig) -> bool {
    // Hard client-protocol codes short-circuit regardless of policy, and an
    // open circuit is never retried within the same call.
    if err.is_client_protocol() {
        return false;
    }
    if matches!(err, TandemError::CircuitOpen(_)) {
        return false;
    }

    if let Some(status) = err.status() {
        return config.retry_on.contains(&status);
    }
    if err.transport_class().is_some() {
        return true;
    }
    if err.is_timeout() {
        return true;
    }

    // Errors relayed in a peer's envelope: transient peer-side conditions
    // retry, everything else surfaces.
    if let TandemError::Remote { code, .. } = err {
        return code == "METHOD_BULKHEAD_EXCEEDED" || code == "TIMEOUT";
    }

    false
}

/// Run `op` under the retry policy.
///
/// `op` receives the 0-indexed attempt number. `on_retry` is invoked once
/// per retry (not for the first attempt), before the backoff sleep; the
/// caller uses it to count retries. On exhaustion the last error is
/// surfaced.
pub async fn run_with_retry<T, F, Fut, C>(
    config: &RetryConfig,
    mut op: F,
    mut on_retry: C,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    C: FnMut(u32, &TandemError),
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !should_retry(&err, config) {
                    return Err(err);
                }
                if attempt < config.max_retries {
                    on_retry(attempt, &err);
                    let delay = compute_delay(config, attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_attempts = config.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| TandemError::Internal("retry loop exhausted without an error".into())))
}
