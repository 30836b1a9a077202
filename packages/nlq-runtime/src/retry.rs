//! Bounded retry for external calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Runs `operation` up to `attempts` times, retrying only errors for which
/// `is_transient` returns true.
///
/// The attempt number (starting at 1) is passed to the operation. The last
/// error is returned once attempts are exhausted.
pub async fn retry_transient<F, Fut, T, E, P>(
    mut operation: F,
    attempts: u32,
    retry_delay_ms: u64,
    context: &str,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt >= attempts || !is_transient(&err) {
                    return Err(err);
                }

                tracing::warn!(
                    "Transient failure in {} (attempt {}/{}): {}",
                    context,
                    attempt,
                    attempts,
                    err
                );

                if retry_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }
}
