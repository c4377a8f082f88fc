use std::time::Duration;

/// Exponential backoff for live feed reconnects.
///
/// Delay for attempt `n` (0-indexed) is `initial * 2^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// `max_attempts` of None retries forever.
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt`, or None once attempts are exhausted.
    pub fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }

        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        let delay = self.initial_delay.saturating_mul(factor);
        Some(delay.min(self.max_delay))
    }

    pub fn should_retry(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), Some(8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_capped() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            None,
        );
        assert_eq!(backoff.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(1), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(3), Some(Duration::from_millis(800)));
        assert_eq!(backoff.next_delay(4), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.next_delay(200), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_attempts_exhaust() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), Some(2));
        assert!(backoff.next_delay(0).is_some());
        assert!(backoff.next_delay(1).is_some());
        assert_eq!(backoff.next_delay(2), None);
        assert!(!backoff.should_retry(2));
    }
}
