//! Catch-up rate pacing
//!
//! Instead of sleeping a fixed interval between sends, the pacer measures
//! how much time passed since the previous check and reports how many
//! whole intervals fit into it. A late check therefore yields a burst of
//! catch-up sends rather than a permanently lower rate.

use std::time::Duration;

use tokio::time::Instant;

/// Pacing state for one publishing session.
#[derive(Debug, Clone)]
pub struct RatePacer {
    interval: Duration,
    last_check: Instant,
}

impl RatePacer {
    /// Pacer for `rate` updates per second. A rate of zero is treated as one.
    pub fn new(rate: u32) -> Self {
        Self {
            interval: Self::interval_for(rate),
            last_check: Instant::now(),
        }
    }

    /// Target spacing between updates at `rate` updates per second.
    pub fn interval_for(rate: u32) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(rate.max(1)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Restart the elapsed-time counter at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.last_check = now;
    }

    /// Number of whole intervals elapsed since the last check.
    ///
    /// Always restarts the counter at `now`; any fractional remainder is
    /// discarded.
    pub fn updates_due(&mut self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_check);
        self.last_check = now;
        (elapsed.as_nanos() / self.interval.as_nanos().max(1)) as u64
    }
}
