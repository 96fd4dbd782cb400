//! Call countdown.
//!
//! Remaining time is recomputed on every tick from the session's creation
//! timestamp and the current wall clock:
//!
//! ```text
//! remaining = max(0, budget - (now - created_at))
//! ```
//!
//! Nothing is ever decremented, so a suspended process, a late tick or a
//! clock jump corrects itself on the next tick.

use chrono::{DateTime, Utc};

/// Output of one [`CallTimer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Still running; whole seconds left, rounded up
    Tick {
        /// Seconds remaining, `>= 1`
        remaining_secs: u64,
    },
    /// Budget used up. Emitted exactly once.
    Expired,
}

/// Wall-clock derived countdown for one call.
#[derive(Debug, Clone)]
pub struct CallTimer {
    created_at: DateTime<Utc>,
    budget_secs: u64,
    running: bool,
}

impl CallTimer {
    /// Start counting down `budget_secs` from `created_at`.
    pub fn start(created_at: DateTime<Utc>, budget_secs: u64) -> Self {
        Self {
            created_at,
            budget_secs,
            running: true,
        }
    }

    /// Seconds left at `now`, rounded up, clamped to `0..=budget`.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let budget_ms = i64::try_from(self.budget_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let elapsed_ms = (now - self.created_at).num_milliseconds().max(0);
        let left_ms = budget_ms.saturating_sub(elapsed_ms).max(0);
        // ceil so that T+299.5s still shows 1s left
        (left_ms / 1000 + i64::from(left_ms % 1000 != 0)) as u64
    }

    /// Recompute from `now`.
    ///
    /// Returns `None` once the timer has expired or been stopped.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TimerEvent> {
        if !self.running {
            return None;
        }
        match self.remaining_at(now) {
            0 => {
                self.running = false;
                Some(TimerEvent::Expired)
            }
            remaining_secs => Some(TimerEvent::Tick { remaining_secs }),
        }
    }

    /// Stop without expiring. Later ticks return `None`.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Whether ticks still produce events.
    pub fn is_running(&self) -> bool {
        self.running
    }
}
