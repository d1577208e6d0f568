use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Bounded, jittered backoff applied to optimistic-lock conflicts on a slot.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: usize,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter: f64,
}

impl RetryPolicy {
    /// `attempts` counts the first try; the delay doubles from `base_delay_ms` up to
    /// `max_delay_ms`, spread by `jitter` (a fraction of the delay) either way.
    pub fn new(attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter: f64) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        let ms = self
            .base_delay_ms
            .saturating_mul(1 << retry.min(16))
            .min(self.max_delay_ms);
        let spread = (ms as f64 * self.jitter) as i64;
        if spread == 0 {
            return Duration::from_millis(ms);
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(ms.saturating_add_signed(offset))
    }

    /// Runs `op` until it succeeds, fails with an error `retryable` rejects, or the
    /// attempts run out; the last error is returned in the latter two cases.
    pub async fn retry_if<T, E, F, Fut, P>(&self, retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Err(err) if retry + 1 < self.attempts && retryable(&err) => {
                    sleep(self.backoff(retry as u32)).await;
                    retry += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 20ms doubling to 200ms.
    fn default() -> Self {
        Self::new(3, 20, 200, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::new(5, 10, 50, 0.0);
        let delays: Vec<_> = (0..4).map(|r| policy.backoff(r).as_millis()).collect();
        assert_eq!(delays, vec![10, 20, 40, 50]);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_attempts_run_out() {
        let policy = RetryPolicy::new(3, 1, 1, 0.0);
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = policy
            .retry_if(
                |e| *e == "conflict",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("conflict") }
                },
            )
            .await;
        assert_eq!(result, Err("conflict"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_fail_on_first_attempt() {
        let policy = RetryPolicy::new(3, 1, 1, 0.0);
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = policy
            .retry_if(
                |e| *e == "conflict",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("capacity") }
                },
            )
            .await;
        assert_eq!(result, Err("capacity"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
