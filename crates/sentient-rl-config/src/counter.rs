//! Shared step counter
//!
//! The counter is injected rather than global so several agents can run in
//! one process and tests can drive it deterministically. Clones share the
//! same underlying counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::update::UpdateMode;

/// Consistent view of the counter at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StepSnapshot {
    /// Environment time steps taken
    pub time_steps: u64,
    /// Episodes finished
    pub episodes: u64,
}

impl StepSnapshot {
    /// Counter selected by `mode`
    #[must_use]
    pub fn get(&self, mode: UpdateMode) -> u64 {
        match mode {
            UpdateMode::TimeSteps => self.time_steps,
            UpdateMode::Episodes => self.episodes,
        }
    }
}

/// Monotonic time-step and episode counter shared between workers
#[derive(Debug, Clone, Default)]
pub struct StepCounter {
    time_steps: Arc<AtomicU64>,
    episodes: Arc<AtomicU64>,
}

impl StepCounter {
    /// Counter starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter resuming from `snapshot`
    #[must_use]
    pub fn resume(snapshot: StepSnapshot) -> Self {
        Self {
            time_steps: Arc::new(AtomicU64::new(snapshot.time_steps)),
            episodes: Arc::new(AtomicU64::new(snapshot.episodes)),
        }
    }

    /// Add `n` time steps and return the new total.
    ///
    /// Concurrent callers each observe a distinct total.
    pub fn advance(&self, n: u64) -> u64 {
        self.time_steps.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Record a finished episode and return the new total.
    pub fn end_episode(&self) -> u64 {
        self.episodes.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Time steps taken so far
    #[must_use]
    pub fn time_steps(&self) -> u64 {
        self.time_steps.load(Ordering::Acquire)
    }

    /// Episodes finished so far
    #[must_use]
    pub fn episodes(&self) -> u64 {
        self.episodes.load(Ordering::Acquire)
    }

    /// Current counts
    #[must_use]
    pub fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            time_steps: self.time_steps(),
            episodes: self.episodes(),
        }
    }
}
