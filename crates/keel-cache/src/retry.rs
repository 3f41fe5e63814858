//! Retry pacing for lock acquisition.

use std::time::Duration;

/// Decides whether, and after how long, the next attempt should run.
/// `None` means give up.
pub trait RetryStrategy: Send {
    fn next(&mut self) -> Option<Duration>;
}

/// Retries at a fixed interval up to a maximum number of attempts.
pub struct FixedIntervalRetry {
    interval: Duration,
    max_attempts: usize,
    attempted: usize,
}

impl FixedIntervalRetry {
    pub fn new(interval: Duration, max_attempts: usize) -> Self {
        Self {
            interval,
            max_attempts,
            attempted: 0,
        }
    }
}

impl RetryStrategy for FixedIntervalRetry {
    fn next(&mut self) -> Option<Duration> {
        if self.attempted >= self.max_attempts {
            return None;
        }
        self.attempted += 1;
        Some(self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_exactly_max_attempts() {
        let mut retry = FixedIntervalRetry::new(Duration::from_millis(100), 3);
        assert_eq!(retry.next(), Some(Duration::from_millis(100)));
        assert_eq!(retry.next(), Some(Duration::from_millis(100)));
        assert_eq!(retry.next(), Some(Duration::from_millis(100)));
        assert_eq!(retry.next(), None);
        assert_eq!(retry.next(), None);
    }
}
