use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Shared retry/backoff helper for outbound HTTP calls (§5, §9 — "implement
/// as a single helper shared across all outbound HTTP; do not scatter
/// per-call sleeps"). Schedule: 1s, 2s, 4s, up to 3 attempts, grounded on
/// the teacher's `skynet-channels::manager::connect_with_backoff`.
///
/// `classify` distinguishes retryable failures (429/5xx/timeout) from
/// terminal ones (any other 4xx) per the taxonomy in §7 kind 1 vs kind 2/3.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation_name: &str,
    mut attempt: F,
    classify: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let mut delay = Duration::from_secs(1);

    for attempt_num in 1..=MAX_ATTEMPTS {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt_num == MAX_ATTEMPTS || !classify(&e) => return Err(e),
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempt = attempt_num,
                    retry_after_secs = delay.as_secs(),
                    "transient failure, retrying with backoff"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }

    unreachable!("retry loop always returns inside the match arms above")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            "test",
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_error_does_not_retry() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            "test",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err("terminal") }
            },
            |_| false,
        )
        .await;
        assert_eq!(result, Err("terminal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
