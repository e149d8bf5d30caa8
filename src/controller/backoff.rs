//! # Fibonacci Backoff
//!
//! Per-DynaKube retry delays for failed reconcile passes. The delay grows
//! along the Fibonacci sequence, scaled by the minimum and capped at the
//! maximum, and starts over after a successful pass.
//!
//! ```rust
//! use dynakube_operator::controller::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(Duration::from_secs(30), Duration::from_secs(300));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(90));
//! ```

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    /// Fibonacci factors of `min`
    prev: u32,
    current: u32,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            prev: 0,
            current: 1,
        }
    }

    /// Current delay; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self
            .min
            .checked_mul(self.current)
            .map_or(self.max, |d| d.min(self.max));
        if delay < self.max {
            let next = self.prev.saturating_add(self.current);
            self.prev = self.current;
            self.current = next;
        }
        delay
    }

    pub fn reset(&mut self) {
        self.prev = 0;
        self.current = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_sequence_is_capped() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(30), Duration::from_secs(300));
        let delays: Vec<u64> = (0..9).map(|_| secs(&mut backoff)).collect();
        assert_eq!(delays, vec![30, 30, 60, 90, 150, 240, 300, 300, 300]);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(10), Duration::from_secs(600));
        for _ in 0..5 {
            backoff.next_backoff();
        }
        backoff.reset();
        assert_eq!(secs(&mut backoff), 10);
        assert_eq!(secs(&mut backoff), 10);
        assert_eq!(secs(&mut backoff), 20);
    }

    #[test]
    fn test_max_below_min_uses_min() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(secs(&mut backoff), 30);
        assert_eq!(secs(&mut backoff), 30);
    }

    #[test]
    fn test_independent_instances() {
        let mut first = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(100));
        let mut second = first.clone();
        for _ in 0..4 {
            first.next_backoff();
        }
        assert_eq!(secs(&mut second), 1);
        assert_eq!(secs(&mut first), 5);
    }
}
