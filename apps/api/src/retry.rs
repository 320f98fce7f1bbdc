//! Single-retry wrapper shared by the embedding and generation capabilities.
//!
//! Capability clients make exactly one HTTP attempt each; this module owns the
//! retry policy so every caller (index build, retrieval, Manager, Coach) gets the
//! same behavior: one retry with backoff, and only for transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Total attempts: the initial call plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;
/// Delay before the retry.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Errors that may succeed on a second attempt (network failures, 429, 5xx).
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Runs `op`, retrying once after `RETRY_BACKOFF` if the first attempt fails
/// with a transient error.
pub async fn retry_once<T, E, F, Fut>(what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS && e.is_transient() => {
                warn!(
                    "{what} attempt {attempt} failed ({e}), retrying after {}ms...",
                    RETRY_BACKOFF.as_millis()
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_once() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry_once("test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(Flaky(true))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_second_transient_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry_once("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Flaky(true))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry_once("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Flaky(false))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
