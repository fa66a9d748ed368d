//! Timeout helper.

use std::future::Future;
use std::time::Duration;

/// Wrap a fallible future with a deadline, mapping expiry into the
/// caller's error type.
pub async fn with_timeout<T, E>(
    duration: Duration,
    future: impl Future<Output = Result<T, E>>,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(duration)),
    }
}
