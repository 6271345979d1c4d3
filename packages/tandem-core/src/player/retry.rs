//! Retry logic for transient player API errors.
//!
//! Covers rate limiting and request timeouts at the HTTP boundary only. The
//! sync loop itself never retries; a failed tick ends the loop.

use std::future::Future;
use std::time::Duration;

use super::client::PlayerResult;

/// Retry delays for transient errors (exponential backoff).
const RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Executes a player request, retrying transient failures with backoff.
///
/// # Arguments
/// * `action` - Action name for logging
/// * `operation` - Closure that performs the request
pub(crate) async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> PlayerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PlayerResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() && attempt < RETRY_DELAYS_MS.len() => {
                let delay_ms = RETRY_DELAYS_MS[attempt];
                attempt += 1;
                log::warn!(
                    "[Player] {} transient error: {} (retry {}/{} in {}ms)",
                    action,
                    e,
                    attempt,
                    RETRY_DELAYS_MS.len(),
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerError;
    use std::sync::atomic::{AtomicU8, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limited_until_success() {
        let calls = AtomicU8::new(0);
        let result = with_retry("Test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(PlayerError::RateLimited)
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_all_delays() {
        let calls = AtomicU8::new(0);
        let result: PlayerResult<()> = with_retry("Test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PlayerError::RateLimited)
        })
        .await;

        assert!(matches!(result, Err(PlayerError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn does_not_retry_classified_errors() {
        let calls = AtomicU8::new(0);
        let result: PlayerResult<()> = with_retry("Test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PlayerError::NoActiveDevice)
        })
        .await;

        assert!(matches!(result, Err(PlayerError::NoActiveDevice)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
