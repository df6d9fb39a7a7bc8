//! Minimum-interval gate for outbound commands.

use std::time::{Duration, Instant};

/// Lets an event through only if `min_interval` has passed since the last one
/// that went through
///
/// Events refused by the gate are not remembered: there is no queue and no
/// catch-up, the next accepted event is simply whatever arrives after the
/// interval.
#[derive(Debug, Clone)]
pub struct MinIntervalGate {
    min_interval: Duration,
    last: Option<Instant>,
}

impl MinIntervalGate {
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Whether an event at `now` may pass, without recording it
    #[must_use]
    pub fn is_open(&self, now: Instant) -> bool {
        self.last
            .map_or(true, |last| now.saturating_duration_since(last) >= self.min_interval)
    }

    /// Record a successful event at `now`
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Check and record in one step
    pub fn try_pass(&mut self, now: Instant) -> bool {
        if self.is_open(now) {
            self.mark(now);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
