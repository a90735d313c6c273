//! Update scheduling
//!
//! [`UpdatePolicy`] is the resolved `update_spec`. [`UpdateScheduler`] turns
//! it into per-step decisions that depend only on the counter value and the
//! amount of buffered experience passed in, so there is no hidden timer
//! state to keep consistent across workers.

use serde::Serialize;
use sentient_rl_spec::{ConfigError, Result};

use crate::document::Section;
use crate::options::UnknownFieldPolicy;

/// Which counter drives updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Environment time steps
    TimeSteps,
    /// Finished episodes
    Episodes,
}

/// Which counter drives target syncs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncBasis {
    /// The same counter as updates
    Steps,
    /// Number of updates performed
    Updates,
}

/// Periodic target network sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetSync {
    /// Sync every `interval` counts
    pub interval: u64,
    /// What is being counted
    pub basis: SyncBasis,
}

/// Gradient passes per update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IterationSpec {
    /// Passes over the batch per update
    pub num_iterations: u64,
    /// Minibatch size per pass
    pub sample_size: u64,
}

/// Which update fields an agent family uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFamily {
    /// Single pass per update plus target sync (DQN-style)
    TargetSync(SyncBasis),
    /// Several minibatch passes per update, no target network (PPO-style)
    Iterative,
}

/// Resolved `update_spec`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdatePolicy {
    /// Counter driving updates
    pub update_mode: UpdateMode,
    /// Master switch for learning
    pub do_updates: bool,
    /// Update every `update_interval` counts
    pub update_interval: u64,
    /// Records per update batch
    pub batch_size: u64,
    /// Buffered records required before the first update
    pub min_buffered: u64,
    /// Target sync, for agents with a target network
    pub target_sync: Option<TargetSync>,
    /// Minibatch passes, for iterative agents
    pub iterations: Option<IterationSpec>,
}

/// Resolve `update_spec`.
///
/// `observe_buffer_size` is `observe_spec.buffer_size` when the document has
/// one. The buffered-experience threshold is the largest of that,
/// `steps_before_update` and `batch_size`.
pub fn resolve(
    mut section: Section<'_>,
    family: UpdateFamily,
    agent_type: &str,
    observe_buffer_size: Option<u64>,
    policy: UnknownFieldPolicy,
) -> Result<UpdatePolicy> {
    match family {
        UpdateFamily::TargetSync(_) => section.forbid(&["num_iterations", "sample_size"], agent_type)?,
        UpdateFamily::Iterative => section.forbid(&["sync_interval"], agent_type)?,
    }

    let mode_path = section.path_of("update_mode");
    let update_mode = match section.str("update_mode")?.unwrap_or("time_steps") {
        "time_steps" => UpdateMode::TimeSteps,
        "episodes" => UpdateMode::Episodes,
        other => {
            return Err(ConfigError::invalid(
                mode_path,
                format!("update_mode must be `time_steps` or `episodes`, got `{other}`"),
            ))
        }
    };
    let do_updates = section.bool("do_updates")?.unwrap_or(true);
    let update_interval = section.require_interval("update_interval")?;

    let batch_path = section.path_of("batch_size");
    let batch_size = match section.require("batch_size")?.as_u64() {
        Some(b) if b > 0 => b,
        _ => return Err(ConfigError::invalid(batch_path, "batch_size must be a positive integer")),
    };
    let steps_before_update = section.u64("steps_before_update")?.unwrap_or(0);

    let target_sync = match family {
        UpdateFamily::TargetSync(basis) => Some(TargetSync {
            interval: section.require_interval("sync_interval")?,
            basis,
        }),
        UpdateFamily::Iterative => None,
    };

    let iterations = match family {
        UpdateFamily::Iterative => {
            let num_iterations = section.interval("num_iterations")?.unwrap_or(1);
            let sample_path = section.path_of("sample_size");
            let sample_size = section.interval("sample_size")?.unwrap_or(batch_size);
            if sample_size > batch_size {
                return Err(ConfigError::InconsistentFields {
                    path: sample_path,
                    reason: format!("sample_size {sample_size} exceeds batch_size {batch_size}"),
                });
            }
            Some(IterationSpec {
                num_iterations,
                sample_size,
            })
        }
        UpdateFamily::TargetSync(_) => None,
    };

    section.finish(policy)?;

    let min_buffered = batch_size
        .max(steps_before_update)
        .max(observe_buffer_size.unwrap_or(0));
    let update = UpdatePolicy {
        update_mode,
        do_updates,
        update_interval,
        batch_size,
        min_buffered,
        target_sync,
        iterations,
    };
    tracing::debug!(?update, "resolved update policy");
    Ok(update)
}

/// Scheduler phase at a given step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Not enough experience buffered yet
    Collecting,
    /// Enough experience, waiting for the next update step
    Ready,
    /// An update fires at this step
    Updating,
}

/// Per-step update and sync decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateScheduler {
    policy: UpdatePolicy,
}

impl UpdateScheduler {
    /// Scheduler for `policy`
    #[must_use]
    pub fn new(policy: UpdatePolicy) -> Self {
        Self { policy }
    }

    /// The policy being scheduled
    #[must_use]
    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    /// Counter driving updates
    #[must_use]
    pub fn update_mode(&self) -> UpdateMode {
        self.policy.update_mode
    }

    /// Counter driving target syncs, if the agent has a target network
    #[must_use]
    pub fn sync_basis(&self) -> Option<SyncBasis> {
        self.policy.target_sync.map(|s| s.basis)
    }

    /// Phase at `step` with `buffered` records in memory
    #[must_use]
    pub fn state(&self, step: u64, buffered: u64) -> SchedulerState {
        if buffered < self.policy.min_buffered {
            SchedulerState::Collecting
        } else if self.should_update(step, buffered) {
            SchedulerState::Updating
        } else {
            SchedulerState::Ready
        }
    }

    /// Whether a learning update fires at `step`.
    ///
    /// Step 0 never fires: nothing has been observed yet.
    #[must_use]
    pub fn should_update(&self, step: u64, buffered: u64) -> bool {
        self.policy.do_updates
            && step > 0
            && step % self.policy.update_interval == 0
            && buffered >= self.policy.min_buffered
    }

    /// Whether the target network syncs at `count`, counted per
    /// [`sync_basis`](Self::sync_basis).
    ///
    /// With [`SyncBasis::Steps`], `count` is the step counter and the sync
    /// is independent of the update decision. With [`SyncBasis::Updates`],
    /// `count` is the number of updates finished before the current one and
    /// the sync rides along with that update: the first sync lands on the
    /// second update, then every `interval` updates.
    #[must_use]
    pub fn should_sync_target(&self, count: u64) -> bool {
        self.policy.target_sync.is_some_and(|sync| match sync.basis {
            SyncBasis::Steps => count > 0 && count % sync.interval == 0,
            SyncBasis::Updates => count % sync.interval == 1 % sync.interval,
        })
    }

    /// Gradient passes per update
    #[must_use]
    pub fn iterations_for_update(&self) -> u64 {
        self.policy.iterations.map_or(1, |i| i.num_iterations)
    }

    /// Records per gradient pass
    #[must_use]
    pub fn minibatch_size(&self) -> u64 {
        self.policy
            .iterations
            .map_or(self.policy.batch_size, |i| i.sample_size)
    }
}
