// Bounded retry with exponential backoff for transient collaborator errors.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// A policy that tries once and never sleeps.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Doubling intervals from `base_delay`, capped at `max_delay`, without
    /// jitter. The attempt budget is enforced by [`with_backoff`], not here.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(5))
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
/// The last error is returned unchanged.
pub async fn with_backoff<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts;
    let mut attempt = 0u32;
    backoff::future::retry_notify(
        policy.backoff(),
        || {
            attempt += 1;
            let last = attempt >= attempts;
            let call = op();
            async move {
                call.await.map_err(|e| {
                    if last {
                        backoff::Error::permanent(e)
                    } else {
                        backoff::Error::transient(e)
                    }
                })
            }
        },
        |e: E, delay: Duration| {
            tracing::warn!("{what} failed: {e}; retrying in {delay:?}");
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Backoff;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(1));
        let mut backoff = policy.backoff();
        let millis: Vec<u128> = (0..6)
            .map(|_| backoff.next_backoff().unwrap().as_millis())
            .collect();
        assert_eq!(millis, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_backoff_recovers() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = with_backoff(&RetryPolicy::default(), "op", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(format!("boom {n}"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_backoff_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_backoff(&RetryPolicy::default(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;
        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_policy_none_tries_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _: Result<(), String> = with_backoff(&RetryPolicy::none(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("x".into())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
