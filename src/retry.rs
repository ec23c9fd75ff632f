//! Opt-in retry with exponential backoff
//!
//! Sessions never retry on their own. Callers that want to ride out a
//! server restart wrap their call in [`retry`].

use rand::Rng;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::Result;

/// Exponential backoff with optional jitter, clamped to `[min, max]`
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    factor: f64,
    jitter: bool,
    min: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, factor: f64, jitter: bool) -> Self {
        Self {
            attempt: 0,
            factor: if factor > 0.0 { factor } else { 2.0 },
            jitter,
            min,
            max,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.min_backoff(),
            config.max_backoff(),
            config.factor,
            config.jitter,
        )
    }

    /// Delay for a given attempt number, without advancing
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        if self.min >= self.max {
            return self.max;
        }

        let min = self.min.as_nanos() as f64;
        let mut delay = min * self.factor.powi(attempt.min(i32::MAX as u32) as i32);
        if self.jitter && delay > min {
            delay = rand::thread_rng().gen_range(min..delay);
        }

        if !delay.is_finite() || delay >= self.max.as_nanos() as f64 {
            return self.max;
        }
        Duration::from_nanos(delay as u64).max(self.min)
    }

    /// Delay for the current attempt, then advance
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, runs out
/// of attempts, or the deadline passes. Returns the last error.
pub fn retry<T, F>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let deadline = Instant::now() + config.deadline();
    let mut backoff = Backoff::from_config(config);

    loop {
        let err = match op() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let attempts = backoff.attempt() + 1;
        if !err.is_retryable() || attempts >= config.max_attempts {
            return Err(err);
        }

        let delay = backoff.next_delay();
        if Instant::now() + delay >= deadline {
            debug!(attempts, error = %err, "Retry deadline reached");
            return Err(err);
        }

        debug!(attempts, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::session::SessionHandle;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            min_backoff_ms: 1,
            max_backoff_ms: 4,
            deadline_ms: 5_000,
            factor: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_grows_and_clamps() {
        let mut backoff = Backoff::new(
            Duration::from_millis(1),
            Duration::from_millis(100),
            2.0,
            false,
        );
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4));
        assert_eq!(backoff.for_attempt(20), Duration::from_millis(100));
        assert_eq!(backoff.for_attempt(u32::MAX), Duration::from_millis(100));

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let backoff = Backoff::new(
            Duration::from_millis(10),
            Duration::from_millis(500),
            2.0,
            true,
        );
        for attempt in 0..12 {
            let delay = backoff.for_attempt(attempt);
            assert!(delay >= Duration::from_millis(10), "{:?}", delay);
            assert!(delay <= Duration::from_millis(500), "{:?}", delay);
        }
    }

    #[test]
    fn test_retry_until_success() {
        let mut calls = 0;
        let result = retry(&config(5), || {
            calls += 1;
            if calls < 3 {
                Err(ClientError::Timeout)
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<()> = retry(&config(3), || {
            calls += 1;
            Err(ClientError::Timeout)
        });
        assert!(matches!(result, Err(ClientError::Timeout)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_error_returns_immediately() {
        let mut calls = 0;
        let result: Result<()> = retry(&config(5), || {
            calls += 1;
            Err(ClientError::InvalidHandle(SessionHandle::from_raw(3)))
        });
        assert!(matches!(result, Err(ClientError::InvalidHandle(_))));
        assert_eq!(calls, 1);
    }
}
