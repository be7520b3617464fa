//! Input debouncing for search-as-you-type
//!
//! Only the last value of a burst is delivered, once no new value has
//! arrived for the quiet period. Time is passed in explicitly.

use std::time::{Duration, Instant};

pub const DEFAULT_QUIET: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET)
    }
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Replaces any pending value and restarts the timer.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((now + self.quiet, value));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    /// Takes the pending value if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline() {
            Some(at) if now >= at => self.pending.take().map(|(_, v)| v),
            _ => None,
        }
    }

    /// Takes the pending value immediately.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(_, v)| v)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_last_value_of_burst_fires() {
        let start = Instant::now();
        let mut d = Debouncer::default();
        d.push("b", start);
        d.push("bi", start + Duration::from_millis(100));
        d.push("bir", start + Duration::from_millis(150));

        assert_eq!(d.poll(start + Duration::from_millis(200)), None);
        assert_eq!(d.poll(start + Duration::from_millis(349)), None);
        assert_eq!(d.poll(start + Duration::from_millis(350)), Some("bir"));
        assert_eq!(d.poll(start + Duration::from_millis(900)), None);
    }

    #[test]
    fn test_flush_and_cancel() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(50));
        d.push(1, start);
        assert_eq!(d.flush(), Some(1));
        assert_eq!(d.flush(), None);

        d.push(2, start);
        d.cancel();
        assert_eq!(d.poll(start + Duration::from_secs(1)), None);
        assert_eq!(d.deadline(), None);
    }
}
