use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sentient_rl_config::prelude::*;
use sentient_rl_config::{resolve, Observed, SchedulerState, UpdateRequest};

fn dqn(update_spec: serde_json::Value) -> AgentConfig {
    resolve(&json!({
        "type": "dqn",
        "memory_spec": {"type": "replay", "capacity": 10000},
        "network_spec": [{"type": "dense", "units": 16}],
        "update_spec": update_spec,
        "optimizer_spec": {"type": "adam", "learning_rate": 0.001}
    }))
    .unwrap()
}

#[test]
fn test_updates_fire_only_on_interval() {
    let config = dqn(json!({"update_interval": 4, "batch_size": 8, "sync_interval": 100}));
    let scheduler = config.scheduler();

    let fired: Vec<u64> = (0..=40)
        .filter(|&step| scheduler.should_update(step, step))
        .collect();
    assert_eq!(fired, vec![8, 12, 16, 20, 24, 28, 32, 36, 40]);
}

#[test]
fn test_scheduler_states() {
    let config = dqn(json!({"update_interval": 4, "batch_size": 8, "sync_interval": 100}));
    let scheduler = config.scheduler();

    assert_eq!(scheduler.state(4, 4), SchedulerState::Collecting);
    assert_eq!(scheduler.state(9, 9), SchedulerState::Ready);
    assert_eq!(scheduler.state(12, 12), SchedulerState::Updating);
}

#[test]
fn test_do_updates_false_never_fires() {
    let config = dqn(json!({
        "update_interval": 4,
        "batch_size": 8,
        "sync_interval": 100,
        "do_updates": false
    }));
    let scheduler = config.scheduler();
    assert!((0..100).all(|step| !scheduler.should_update(step, 10_000)));
}

#[test]
fn test_steps_before_update_raises_threshold() {
    let config = dqn(json!({
        "update_interval": 4,
        "batch_size": 8,
        "sync_interval": 100,
        "steps_before_update": 20
    }));
    assert_eq!(config.update.min_buffered, 20);
    assert!(!config.scheduler().should_update(16, 16));
    assert!(config.scheduler().should_update(20, 20));
}

#[test]
fn test_shared_counter_drives_schedules() {
    let config = dqn(json!({"update_interval": 4, "batch_size": 4, "sync_interval": 8}));
    let scheduler = config.scheduler();
    let counter = StepCounter::new();
    let worker = counter.clone();

    let mut updates = 0;
    for _ in 0..16 {
        let step = worker.advance(1);
        if scheduler.should_update(step, step) {
            updates += 1;
        }
    }
    assert_eq!(counter.time_steps(), 16);
    assert_eq!(updates, 4);
}

struct Scripted {
    losses: Vec<f64>,
    requests: Vec<UpdateRequest>,
    syncs: Vec<u64>,
}

#[async_trait]
impl AgentRuntime for Scripted {
    async fn observe(&mut self, _time_step: u64) -> Result<Observed, ExecutionError> {
        Ok(Observed {
            records: 1,
            episode_done: false,
        })
    }

    async fn update(&mut self, request: &UpdateRequest) -> Result<f64, ExecutionError> {
        self.requests.push(*request);
        Ok(self.losses.pop().unwrap_or(0.0))
    }

    async fn sync_target(&mut self, count: u64) -> Result<(), ExecutionError> {
        self.syncs.push(count);
        Ok(())
    }
}

#[tokio::test]
async fn test_apex_syncs_on_update_count() {
    let config = resolve(&json!({
        "type": "apex",
        "memory_spec": {"type": "prioritized_replay", "capacity": 1000, "alpha": 0.6},
        "network_spec": [{"type": "dense", "units": 16}],
        "update_spec": {"update_interval": 2, "batch_size": 4, "sync_interval": 3},
        "optimizer_spec": {"type": "adam", "learning_rate": 0.001}
    }))
    .unwrap();
    let mut driver = UpdateLoop::new(Arc::new(config), StepCounter::new(), 100);
    let mut runtime = Scripted {
        losses: vec![0.1, 0.2, 0.3],
        requests: Vec::new(),
        syncs: Vec::new(),
    };

    let stats = driver.run(&mut runtime, 20).await.unwrap();

    // Updates at steps 4, 6, ..., 20: nine in total. Syncs ride along with
    // the second update and every third one after it.
    assert_eq!(stats.updates, 9);
    assert_eq!(runtime.syncs, vec![2, 5, 8]);
    assert_eq!(stats.syncs, 3);
    assert_eq!(runtime.requests[0].time_step, 4);
    assert_eq!(stats.last_loss, Some(0.0));
}

#[tokio::test]
async fn test_ppo_update_requests_carry_iterations() {
    let config = resolve(&json!({
        "type": "ppo",
        "memory_spec": {"type": "ring_buffer", "capacity": 64},
        "network_spec": [{"type": "dense", "units": 16}],
        "update_spec": {"update_interval": 8, "batch_size": 16, "num_iterations": 4, "sample_size": 8},
        "optimizer_spec": {"type": "sgd", "learning_rate": ["polynomial", 0.01, 0.001]}
    }))
    .unwrap();
    let mut driver = UpdateLoop::new(Arc::new(config), StepCounter::new(), 32);
    let mut runtime = Scripted {
        losses: Vec::new(),
        requests: Vec::new(),
        syncs: Vec::new(),
    };

    driver.run(&mut runtime, 32).await.unwrap();

    let steps: Vec<u64> = runtime.requests.iter().map(|r| r.time_step).collect();
    assert_eq!(steps, vec![16, 24, 32]);
    assert!(runtime.requests.iter().all(|r| r.iterations == 4 && r.minibatch_size == 8));
    assert!(runtime.syncs.is_empty());

    let rates: Vec<f64> = runtime.requests.iter().map(|r| r.learning_rate).collect();
    assert!(rates.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(rates[2], 0.001);
}

#[tokio::test]
async fn test_apex_first_sync_is_early_with_long_interval() {
    let config = resolve(&json!({
        "type": "apex",
        "memory_spec": {"type": "prioritized_replay", "capacity": 1000},
        "network_spec": [{"type": "dense", "units": 16}],
        "update_spec": {"update_interval": 1, "batch_size": 1, "sync_interval": 2500},
        "optimizer_spec": {"type": "adam", "learning_rate": 0.001}
    }))
    .unwrap();
    let mut driver = UpdateLoop::new(Arc::new(config), StepCounter::new(), 3000);
    let mut runtime = Scripted {
        losses: Vec::new(),
        requests: Vec::new(),
        syncs: Vec::new(),
    };

    let stats = driver.run(&mut runtime, 3000).await.unwrap();

    assert_eq!(stats.updates, 3000);
    assert_eq!(runtime.syncs, vec![2, 2502]);
}
