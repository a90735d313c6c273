//! Schedules and error types for SentientOS RL agent documents
//!
//! This crate holds the leaf pieces every section resolver builds on: the
//! typed error taxonomy and the schedule evaluator that turns static or
//! time-varying hyperparameters into value-at-step functions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod schedule;

// Re-export core types
pub use error::{ConfigError, ExecutionError, Result};
pub use schedule::{Horizon, Schedule, ScheduleKind, ScheduleSpec};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{ConfigError, ExecutionError, Schedule, ScheduleSpec};
}
