use std::time::Duration;
use tokio::time::Instant;

/// A caller deadline split into a soft edge and a hard edge.
///
/// Past the soft edge no new work should be started. Work already in flight
/// may keep running until the hard edge (soft edge + grace period).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    soft: Instant,
    hard: Instant,
}

impl Deadline {
    /// Deadline `budget` from now, with `grace` added for in-flight work.
    pub fn after(budget: Duration, grace: Duration) -> Self {
        let soft = Instant::now() + budget;
        Self {
            soft,
            hard: soft + grace,
        }
    }

    pub fn soft(&self) -> Instant {
        self.soft
    }

    /// True once the soft edge has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.soft
    }

    /// Shrink a per-call timeout so it never outlives the hard edge.
    pub fn clamp_timeout(&self, timeout: Duration) -> Duration {
        timeout.min(self.hard.saturating_duration_since(Instant::now()))
    }
}
