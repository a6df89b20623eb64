//! Exponential backoff with jitter

use rand::Rng;
use std::time::Duration;

/// Delay generator for reconnects and retried operations
///
/// Each call to [`Backoff::next_delay`] returns the current delay plus up to
/// `jitter` of it at random, then doubles the delay up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
            jitter: 0.1,
        }
    }

    /// Fraction of the delay added as random jitter (0 disables it)
    #[cfg(test)]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);

        let spread = base.mul_f64(self.jitter);
        if spread.is_zero() {
            return base;
        }
        base + rand::thread_rng().gen_range(Duration::ZERO..=spread)
    }

    /// Back to the initial delay, after a success
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
