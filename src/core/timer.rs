//! Cancellable scheduled tasks driven by an external clock.
//!
//! Nothing here spawns threads or sleeps. The owner polls with the current
//! time and gets back how many firings are due. Cancellation clears the
//! schedule immediately, so a cancelled timer can never fire on a later poll.

use chrono::{DateTime, Duration, Utc};

/// Periodic timer, e.g. the one-second session tick.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next_due: Option<DateTime<Utc>>,
}

impl Ticker {
    pub fn new(period: std::time::Duration) -> Self {
        Self {
            period: Duration::from_std(period).unwrap_or_else(|_| Duration::seconds(1)),
            next_due: None,
        }
    }

    /// Start ticking one period after `now`. Re-arming replaces any previous
    /// schedule.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.next_due = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// Number of ticks due at `now`, advancing the schedule past them.
    pub fn poll(&mut self, now: DateTime<Utc>) -> u32 {
        let mut fired = 0;
        while let Some(due) = self.next_due {
            if now < due {
                break;
            }
            fired += 1;
            self.next_due = Some(due + self.period);
        }
        fired
    }
}

/// One-shot timer, e.g. the post-wheelie cooldown.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<DateTime<Utc>>,
}

impl Deadline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: DateTime<Utc>, after: Duration) {
        self.at = Some(now + after);
    }

    pub fn cancel(&mut self) {
        self.at = None;
    }

    pub fn is_pending(&self) -> bool {
        self.at.is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.at
    }

    /// Returns `true` exactly once, on the first poll at or after the deadline.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.at {
            Some(at) if now >= at => {
                self.at = None;
                true
            }
            _ => false,
        }
    }
}
