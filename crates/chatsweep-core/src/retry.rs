//! Timeouts and single-retry helpers for remote calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Runs a remote call bounded by `timeout`.
///
/// An elapsed timeout becomes [`chatsweep_remote::Error::Timeout`], which is
/// transient.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> chatsweep_remote::Result<T>
where
    F: Future<Output = chatsweep_remote::Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| chatsweep_remote::Error::Timeout(timeout))?
}

/// Picks a delay uniformly from `[min, max]`.
#[must_use]
pub fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Runs `call` with a timeout, retrying once after `delay` on a transient error.
///
/// Permanent errors (rejections, bad responses) are returned immediately.
pub async fn retry_once<T, F, Fut>(
    what: &str,
    timeout: Duration,
    delay: Duration,
    mut call: F,
) -> chatsweep_remote::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = chatsweep_remote::Result<T>>,
{
    match with_timeout(timeout, call()).await {
        Err(e) if e.is_transient() => {
            debug!(what, delay_ms = delay.as_millis(), "Transient failure, retrying once: {e}");
            tokio::time::sleep(delay).await;
            with_timeout(timeout, call()).await
        }
        other => other,
    }
}
