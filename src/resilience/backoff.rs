use rand::Rng;
use std::time::Duration;

/// Exponential backoff: `base * 2^attempt + jitter(0..=base)`, capped at `max`.
///
/// `attempt` is 1-based (the first retry waits for attempt 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay for `attempt` with an explicit jitter value. Jitter above `base` is clamped.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let base_ms = millis(self.base);
        let max_ms = millis(self.max);
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let exp_ms = base_ms.saturating_mul(factor);
        let jitter_ms = millis(jitter).min(base_ms);
        Duration::from_millis(exp_ms.saturating_add(jitter_ms).min(max_ms))
    }

    /// Random jitter in `0..=base`.
    pub fn jitter(&self) -> Duration {
        let base_ms = millis(self.base);
        if base_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=base_ms))
    }

    /// Delay for `attempt` with random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, self.jitter())
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_secs(30))
    }

    #[test]
    fn test_exponential_without_jitter() {
        let b = backoff();
        assert_eq!(b.delay_with_jitter(1, Duration::ZERO), Duration::from_millis(200));
        assert_eq!(b.delay_with_jitter(2, Duration::ZERO), Duration::from_millis(400));
        assert_eq!(b.delay_with_jitter(3, Duration::ZERO), Duration::from_millis(800));
    }

    #[test]
    fn test_non_decreasing_and_capped() {
        let b = backoff();
        let mut prev = Duration::ZERO;
        for attempt in 1..80 {
            let d = b.delay_with_jitter(attempt, Duration::ZERO);
            assert!(d >= prev, "attempt {} went backwards", attempt);
            assert!(d <= Duration::from_secs(30));
            prev = d;
        }
        assert_eq!(prev, Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let b = backoff();
        for _ in 0..200 {
            let d = b.delay(2);
            assert!(d >= Duration::from_millis(400));
            assert!(d <= Duration::from_millis(500));
        }
        // Oversized jitter is clamped to base.
        assert_eq!(
            b.delay_with_jitter(1, Duration::from_secs(5)),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn test_zero_base() {
        let b = Backoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(b.delay(3), Duration::ZERO);
    }
}
