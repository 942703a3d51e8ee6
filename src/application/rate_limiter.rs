// Rate limiter for high-frequency time-window updates
use crate::application::clock::Clock;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// What happened to a submitted value.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<T> {
    /// Apply the value now.
    Applied(T),
    /// Held back as the pending value; call [`RateLimiter::poll`] after `retry_in`.
    Deferred { retry_in: Duration },
}

/// Lets at most one value through per interval while guaranteeing the most
/// recently submitted value is eventually applied.
///
/// The limiter holds no timer of its own. Whoever owns it re-arms a retry of
/// `retry_in` after each deferral (and after each `poll` that leaves a value
/// pending) and calls `poll` when it fires.
pub struct RateLimiter<T> {
    clock: Arc<dyn Clock>,
    interval: Duration,
    retry_delay: Duration,
    last_applied_at: Option<Instant>,
    pending: Option<T>,
}

impl<T> RateLimiter<T> {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration, retry_delay: Duration) -> Self {
        Self {
            clock,
            interval,
            retry_delay,
            last_applied_at: None,
            pending: None,
        }
    }

    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(clock, DEFAULT_INTERVAL, DEFAULT_RETRY_DELAY)
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    pub fn pending_mut(&mut self) -> Option<&mut T> {
        self.pending.as_mut()
    }

    pub fn submit(&mut self, value: T) -> Submission<T> {
        if self.interval_elapsed() {
            // Anything still pending is older than this value.
            self.pending = None;
            self.mark_applied();
            return Submission::Applied(value);
        }

        self.pending = Some(value);
        Submission::Deferred {
            retry_in: self.retry_delay,
        }
    }

    /// Retry hook: yields the latest pending value once the interval allows it.
    pub fn poll(&mut self) -> Option<T> {
        if self.pending.is_none() || !self.interval_elapsed() {
            return None;
        }
        self.mark_applied();
        self.pending.take()
    }

    fn interval_elapsed(&self) -> bool {
        match self.last_applied_at {
            None => true,
            Some(last) => self.clock.now().saturating_duration_since(last) > self.interval,
        }
    }

    fn mark_applied(&mut self) {
        self.last_applied_at = Some(self.clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::ManualClock;

    fn limiter() -> (ManualClock, RateLimiter<u32>) {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_defaults(Arc::new(clock.clone()));
        (clock, limiter)
    }

    #[test]
    fn test_first_submission_applies_immediately() {
        let (_clock, mut limiter) = limiter();
        assert_eq!(limiter.submit(1), Submission::Applied(1));
        assert!(!limiter.has_pending());
    }

    #[test]
    fn test_burst_converges_to_last_value_once() {
        let (clock, mut limiter) = limiter();
        assert_eq!(limiter.submit(0), Submission::Applied(0));

        for value in 1..=20 {
            clock.advance(Duration::from_micros(500));
            assert_eq!(
                limiter.submit(value),
                Submission::Deferred {
                    retry_in: DEFAULT_RETRY_DELAY
                }
            );
        }

        // Interval not over yet: the retry finds nothing to apply.
        assert_eq!(limiter.poll(), None);
        assert!(limiter.has_pending());

        clock.advance(DEFAULT_RETRY_DELAY);
        assert_eq!(limiter.poll(), Some(20));

        clock.advance(DEFAULT_RETRY_DELAY * 5);
        assert_eq!(limiter.poll(), None);
        assert!(!limiter.has_pending());
    }

    #[test]
    fn test_pending_value_fires_without_further_submissions() {
        let (clock, mut limiter) = limiter();
        limiter.submit(1);
        clock.advance(Duration::from_millis(3));
        assert!(matches!(limiter.submit(2), Submission::Deferred { .. }));

        let mut applied = Vec::new();
        for _ in 0..5 {
            clock.advance(DEFAULT_RETRY_DELAY);
            if let Some(value) = limiter.poll() {
                applied.push(value);
            }
        }
        assert_eq!(applied, vec![2]);
    }

    #[test]
    fn test_at_most_one_application_per_interval() {
        let (clock, mut limiter) = limiter();
        let mut applications = 0;
        for value in 0..100 {
            clock.advance(Duration::from_millis(1));
            if let Submission::Applied(_) = limiter.submit(value) {
                applications += 1;
            }
            if limiter.poll().is_some() {
                applications += 1;
            }
        }
        // 100ms of traffic with a 16ms interval: one application per 17ms step.
        assert!(applications <= 100 / 16 + 1, "applied {} times", applications);
    }

    #[test]
    fn test_fresh_submission_supersedes_pending() {
        let (clock, mut limiter) = limiter();
        limiter.submit(1);
        clock.advance(Duration::from_millis(5));
        limiter.submit(2);

        clock.advance(Duration::from_millis(20));
        assert_eq!(limiter.submit(3), Submission::Applied(3));
        assert_eq!(limiter.poll(), None);
    }
}
