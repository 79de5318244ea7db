//! Bounded retry for optimistic-lock conflicts.
//!
//! Each attempt must re-read the object it writes, so the closure is invoked
//! from scratch every time. Only errors that report a conflict are retried;
//! anything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

const INITIAL_DELAY: Duration = Duration::from_millis(20);
const MAX_DELAY: Duration = Duration::from_secs(1);

/// Errors that may clear up after a fresh read.
pub trait Conflicting {
    fn is_conflict(&self) -> bool;
}

impl Conflicting for crate::store::StoreError {
    fn is_conflict(&self) -> bool {
        crate::store::StoreError::is_conflict(self)
    }
}

/// Runs `op` up to `attempts` times while it fails with a conflict.
///
/// `attempts` of 0 is treated as 1. The attempt number (starting at 1) is
/// passed to `op`.
pub async fn on_conflict<T, E, F, Fut>(attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Conflicting + std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut delay = INITIAL_DELAY;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() && attempt < attempts => {
                let wait = jittered(delay);
                debug!(attempt, error = %e, wait_ms = wait.as_millis() as u64, "conflict; retrying with a fresh read");
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
            Err(e) => {
                if e.is_conflict() {
                    warn!(attempt, error = %e, "conflict persisted; giving up");
                }
                return Err(e);
            }
        }
    }
}

/// 0.5x to 1.5x of `delay`.
fn jittered(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.5..1.5);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestErr(bool);

    impl std::fmt::Display for TestErr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "conflict={}", self.0)
        }
    }

    impl Conflicting for TestErr {
        fn is_conflict(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let out = on_conflict(5, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(TestErr(true))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bound() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = on_conflict(2, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestErr(true)) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = on_conflict(5, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestErr(false)) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
