//! Bounded exponential backoff with jitter

use daisy_core::RetrySettings;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the nominal delay drawn uniformly in either direction.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
            multiplier: s.multiplier,
            jitter: s.jitter.clamp(0.0, 1.0),
        }
    }
}

/// The last error seen, and how many attempts it took to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last: E,
}

impl RetryPolicy {
    /// Policy that never waits. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Nominal delay before retry number `attempt` (1-based), capped, without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `attempt`, jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let millis = nominal.as_millis() as f64 * (1.0 + factor);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
    /// or the attempt cap is reached.
    pub async fn run<T, E, P, F, Fut>(&self, is_retryable: P, mut op: F) -> Result<T, RetryError<E>>
    where
        P: Fn(&E) -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(RetryError {
                        attempts: attempt,
                        last: e,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_then_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.nominal_delay(1), Duration::from_millis(500));
        assert_eq!(p.nominal_delay(2), Duration::from_millis(1000));
        assert_eq!(p.nominal_delay(4), Duration::from_millis(4000));
        assert_eq!(p.nominal_delay(5), Duration::from_secs(8));
        assert_eq!(p.nominal_delay(40), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_band() {
        let p = RetryPolicy::default();
        for _ in 0..100 {
            let d = p.delay_for(2).as_millis();
            assert!((800..=1200).contains(&d), "{}", d);
        }
    }

    #[tokio::test]
    async fn retries_only_what_the_predicate_allows() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> = RetryPolicy::immediate(5)
            .run(
                |e: &String| e == "busy",
                |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err("busy".to_string())
                        } else {
                            Err("denied".to_string())
                        }
                    }
                },
            )
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.last, "denied");
    }

    #[tokio::test]
    async fn stops_at_the_attempt_cap() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<&str>> = RetryPolicy::immediate(3)
            .run(
                |_| true,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("busy") }
                },
            )
            .await;
        assert_eq!(result.unwrap_err().attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
