//! Update loop driver
//!
//! [`UpdateLoop`] runs a resolved [`AgentConfig`] against an
//! [`AgentRuntime`]: it advances the shared counter, tracks how much
//! experience memory holds, and asks the scheduler when to learn and when to
//! sync the target network. The runtime owns networks and memory contents.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sentient_rl_spec::ExecutionError;

use crate::agent::AgentConfig;
use crate::counter::StepCounter;
use crate::update::{SchedulerState, SyncBasis, UpdateMode, UpdateScheduler};

/// Result of observing one environment step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observed {
    /// Records inserted into memory
    pub records: u64,
    /// Whether the step ended an episode
    pub episode_done: bool,
}

/// Parameters of one learning update
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UpdateRequest {
    /// Time step the update fires at
    pub time_step: u64,
    /// Records to sample
    pub batch_size: u64,
    /// Gradient passes over the batch
    pub iterations: u64,
    /// Records per pass
    pub minibatch_size: u64,
    /// Learning rate at `time_step`
    pub learning_rate: f64,
}

/// Agent side of the loop
#[async_trait]
pub trait AgentRuntime: Send {
    /// Take one environment step and store what was seen.
    ///
    /// `time_step` is the step being taken; the shared counter is advanced
    /// only after this returns `Ok`.
    async fn observe(&mut self, time_step: u64) -> Result<Observed, ExecutionError>;

    /// Run one learning update and return its loss.
    async fn update(&mut self, request: &UpdateRequest) -> Result<f64, ExecutionError>;

    /// Copy online weights into the target network.
    ///
    /// `count` is the time step (or episode) for step-counted syncs and the
    /// update number for update-counted syncs.
    async fn sync_target(&mut self, count: u64) -> Result<(), ExecutionError> {
        tracing::trace!(count, "runtime has no target network");
        Ok(())
    }
}

/// What happened during one loop step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepReport {
    /// Time step just taken
    pub time_step: u64,
    /// Records held in memory afterwards
    pub buffered: u64,
    /// Scheduler phase
    pub state: SchedulerState,
    /// Loss of the update, if one fired
    pub loss: Option<f64>,
    /// Whether the target network synced
    pub synced: bool,
}

/// Totals over a run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LoopStats {
    /// Time steps taken
    pub steps: u64,
    /// Updates performed
    pub updates: u64,
    /// Target syncs performed
    pub syncs: u64,
    /// Loss of the most recent update
    pub last_loss: Option<f64>,
}

/// Drives observe/update/sync for one agent
#[derive(Debug)]
pub struct UpdateLoop {
    config: Arc<AgentConfig>,
    scheduler: UpdateScheduler,
    counter: StepCounter,
    horizon: u64,
    observed: u64,
    stats: LoopStats,
}

impl UpdateLoop {
    /// Loop over `config`, counting on `counter`; schedules are evaluated
    /// against a run of `horizon` time steps.
    #[must_use]
    pub fn new(config: Arc<AgentConfig>, counter: StepCounter, horizon: u64) -> Self {
        let scheduler = config.scheduler();
        Self {
            config,
            scheduler,
            counter,
            horizon,
            observed: 0,
            stats: LoopStats::default(),
        }
    }

    /// Resolved config being driven
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Totals so far
    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Records currently held in memory
    #[must_use]
    pub fn buffered(&self) -> u64 {
        self.config.memory.stored_after(self.observed)
    }

    /// Take one time step.
    pub async fn step<R>(&mut self, runtime: &mut R) -> Result<StepReport, ExecutionError>
    where
        R: AgentRuntime + ?Sized,
    {
        // The counter only moves once the step has actually been taken.
        let observed = runtime.observe(self.counter.time_steps() + 1).await?;
        let time_step = self.counter.advance(1);
        self.observed = self.observed.saturating_add(observed.records);
        let episodes = if observed.episode_done {
            self.counter.end_episode()
        } else {
            self.counter.episodes()
        };
        let buffered = self.buffered();
        self.stats.steps += 1;

        // Episode-driven agents only decide at episode boundaries.
        let count = match self.scheduler.update_mode() {
            UpdateMode::TimeSteps => Some(time_step),
            UpdateMode::Episodes => observed.episode_done.then_some(episodes),
        };
        let state = match count {
            Some(c) => self.scheduler.state(c, buffered),
            None if buffered < self.scheduler.policy().min_buffered => SchedulerState::Collecting,
            None => SchedulerState::Ready,
        };

        let updates_before = self.stats.updates;
        let mut loss = None;
        if state == SchedulerState::Updating {
            let request = UpdateRequest {
                time_step,
                batch_size: self.scheduler.policy().batch_size,
                iterations: self.scheduler.iterations_for_update(),
                minibatch_size: self.scheduler.minibatch_size(),
                learning_rate: self.config.learning_rate_at(time_step, self.horizon),
            };
            let value = runtime.update(&request).await?;
            self.stats.updates += 1;
            self.stats.last_loss = Some(value);
            loss = Some(value);
            tracing::debug!(time_step, buffered, loss = value, "update");
        }

        // (decision count, count reported to the runtime)
        let sync_count = match self.scheduler.sync_basis() {
            Some(SyncBasis::Steps) => count.map(|c| (c, c)),
            Some(SyncBasis::Updates) => loss.map(|_| (updates_before, self.stats.updates)),
            None => None,
        };
        let synced = match sync_count {
            Some((decide, reported)) if self.scheduler.should_sync_target(decide) => {
                runtime.sync_target(reported).await?;
                self.stats.syncs += 1;
                tracing::debug!(time_step, count = reported, "target sync");
                true
            }
            _ => false,
        };

        Ok(StepReport {
            time_step,
            buffered,
            state,
            loss,
            synced,
        })
    }

    /// Take `steps` time steps and return the running totals.
    pub async fn run<R>(&mut self, runtime: &mut R, steps: u64) -> Result<LoopStats, ExecutionError>
    where
        R: AgentRuntime + ?Sized,
    {
        for _ in 0..steps {
            self.step(runtime).await?;
        }
        tracing::info!(
            steps = self.stats.steps,
            updates = self.stats.updates,
            syncs = self.stats.syncs,
            "update loop finished"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        episode_every: Option<u64>,
        updates: Vec<UpdateRequest>,
        syncs: Vec<u64>,
    }

    #[async_trait]
    impl AgentRuntime for Recorder {
        async fn observe(&mut self, time_step: u64) -> Result<Observed, ExecutionError> {
            Ok(Observed {
                records: 1,
                episode_done: self.episode_every.is_some_and(|n| time_step % n == 0),
            })
        }

        async fn update(&mut self, request: &UpdateRequest) -> Result<f64, ExecutionError> {
            self.updates.push(*request);
            Ok(0.5)
        }

        async fn sync_target(&mut self, count: u64) -> Result<(), ExecutionError> {
            self.syncs.push(count);
            Ok(())
        }
    }

    fn dqn(update_spec: serde_json::Value) -> Arc<AgentConfig> {
        let document = json!({
            "type": "dqn",
            "memory_spec": {"type": "replay", "capacity": 100},
            "network_spec": [{"type": "dense", "units": 8}],
            "optimizer_spec": {"type": "adam", "learning_rate": ["linear", 0.1, 0.01]},
            "update_spec": update_spec,
        });
        Arc::new(resolver::resolve(&document).unwrap())
    }

    #[tokio::test]
    async fn test_updates_wait_for_batch() {
        let config = dqn(json!({"update_interval": 4, "batch_size": 10, "sync_interval": 8}));
        let mut driver = UpdateLoop::new(config, StepCounter::new(), 20);
        let mut runtime = Recorder::default();

        let stats = driver.run(&mut runtime, 20).await.unwrap();

        let steps: Vec<u64> = runtime.updates.iter().map(|r| r.time_step).collect();
        assert_eq!(steps, vec![12, 16, 20]);
        assert_eq!(runtime.syncs, vec![8, 16]);
        assert_eq!(stats.steps, 20);
        assert_eq!(stats.updates, 3);
        assert!((runtime.updates[0].learning_rate - (0.1 - 0.09 * 12.0 / 20.0)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_buffer_is_capped_by_capacity() {
        let config = dqn(json!({"update_interval": 1, "batch_size": 1, "sync_interval": 1000}));
        let mut driver = UpdateLoop::new(config, StepCounter::new(), 0);
        let mut runtime = Recorder::default();

        driver.run(&mut runtime, 150).await.unwrap();
        assert_eq!(driver.buffered(), 100);
    }

    #[tokio::test]
    async fn test_episode_mode_decides_at_boundaries() {
        let document = json!({
            "type": "ppo",
            "memory_spec": {"type": "ring_buffer", "capacity": 64},
            "network_spec": [{"type": "dense", "units": 8}],
            "optimizer_spec": {"type": "adam", "learning_rate": 0.001},
            "update_spec": {"update_mode": "episodes", "update_interval": 2, "batch_size": 4}
        });
        let config = Arc::new(resolver::resolve(&document).unwrap());
        let mut driver = UpdateLoop::new(config, StepCounter::new(), 100);
        let mut runtime = Recorder {
            episode_every: Some(5),
            ..Recorder::default()
        };

        driver.run(&mut runtime, 30).await.unwrap();

        let steps: Vec<u64> = runtime.updates.iter().map(|r| r.time_step).collect();
        assert_eq!(steps, vec![10, 20, 30]);
        assert!(runtime.syncs.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_errors_pass_through() {
        struct Broken;

        #[async_trait]
        impl AgentRuntime for Broken {
            async fn observe(&mut self, _time_step: u64) -> Result<Observed, ExecutionError> {
                Err(ExecutionError::Device("gpu lost".to_string()))
            }

            async fn update(&mut self, _request: &UpdateRequest) -> Result<f64, ExecutionError> {
                Ok(0.0)
            }
        }

        let config = dqn(json!({"update_interval": 1, "batch_size": 1, "sync_interval": 1}));
        let counter = StepCounter::new();
        let mut driver = UpdateLoop::new(config, counter.clone(), 10);
        let err = driver.run(&mut Broken, 3).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Device(ref m) if m == "gpu lost"));
        // A failed observation does not consume a time step.
        assert_eq!(counter.time_steps(), 0);
        assert_eq!(driver.stats().steps, 0);
    }
}
