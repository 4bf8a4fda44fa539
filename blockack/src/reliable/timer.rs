//! The single alarm of a link controller.

use crate::time::{Duration, Instant};

/// Cancel-and-rearm deadline used for the ack timeout.
///
/// Arming an already armed timer replaces the deadline; alarms never stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckTimer {
    deadline: Option<Instant>,
}

impl AckTimer {
    /// Creates a disarmed timer.
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arms the timer to fire `after` from `now`, replacing any deadline.
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Pushes the deadline to `at` if it is currently earlier.
    ///
    /// Arms the timer if it was idle.
    pub fn extend_to(&mut self, at: Instant) {
        match self.deadline {
            Some(deadline) if deadline >= at => {}
            _ => self.deadline = Some(at),
        }
    }

    /// Disarms the timer.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// True while a deadline is set.
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Current deadline.
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarms and returns true if the deadline has been reached.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rearm_replaces_deadline() {
        let mut timer = AckTimer::new();
        let now = Instant::from_micros(1000);

        timer.arm(now, Duration::from_micros(50));
        timer.arm(now, Duration::from_micros(10));
        assert_eq!(timer.deadline(), Some(Instant::from_micros(1010)));

        assert!(!timer.fire(Instant::from_micros(1009)));
        assert!(timer.fire(Instant::from_micros(1010)));
        assert!(!timer.is_armed());
        assert!(!timer.fire(Instant::from_micros(2000)));
    }

    #[test]
    fn test_extend_never_shortens() {
        let mut timer = AckTimer::new();
        timer.arm(Instant::EPOCH, Duration::from_micros(100));

        timer.extend_to(Instant::from_micros(40));
        assert_eq!(timer.deadline(), Some(Instant::from_micros(100)));

        timer.extend_to(Instant::from_micros(300));
        assert_eq!(timer.deadline(), Some(Instant::from_micros(300)));

        timer.cancel();
        timer.extend_to(Instant::from_micros(5));
        assert_eq!(timer.deadline(), Some(Instant::from_micros(5)));
    }
}
