use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_relative_eq;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sentient_rl_config::prelude::*;
use sentient_rl_config::{
    BatchCapacityPolicy, DeviceInventory, DeviceStrategy, EvictionPolicy, MemoryKind, Observed,
    Seed, SyncBasis, UpdateRequest,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs").join(name)
}

fn load(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).unwrap()
}

#[tokio::test]
async fn test_dqn_cartpole_flags_batch_over_capacity() {
    let config = AgentConfigResolver::default()
        .resolve_file(fixture("dqn_agent_for_cartpole.json"))
        .await
        .unwrap();

    assert_eq!(config.agent_type(), AgentType::Dqn);
    assert_eq!(config.memory.capacity, 32);
    assert_eq!(config.memory.eviction(), EvictionPolicy::Unordered);
    assert_eq!(config.update.update_interval, 4);
    assert_eq!(config.update.batch_size, 48);
    assert_eq!(config.execution.seed, Seed::Fixed(10));

    assert_eq!(config.warnings.len(), 1);
    assert_eq!(config.warnings[0].path, "update_spec.batch_size");
    assert!(config.warnings[0].message.contains("exceeds memory capacity"));

    let dqn = config.dqn().unwrap();
    assert!(!dqn.dueling_q);
    assert!(dqn.huber_loss);
    let exploration = dqn.exploration.unwrap();
    assert_eq!(exploration.epsilon_at(0, 0), 1.0);
    assert_relative_eq!(exploration.epsilon_at(500, 0), 0.55, epsilon = 1e-12);
    assert_eq!(exploration.epsilon_at(5000, 0), 0.1);
}

#[test]
fn test_dqn_cartpole_rejected_under_strict_capacity() {
    let resolver = AgentConfigResolver::new(
        ResolverOptions::default().with_batch_capacity(BatchCapacityPolicy::Reject),
    );
    let err = resolver
        .resolve_str(&load("dqn_agent_for_cartpole.json"))
        .unwrap_err();

    assert!(matches!(err, ConfigError::InconsistentFields { .. }));
    assert_eq!(err.path(), Some("update_spec.batch_size"));
}

#[test]
fn test_dqn_cartpole_target_sync() {
    let config = tokio_test::block_on(
        AgentConfigResolver::default().resolve_file(fixture("dqn_agent_for_cartpole.json")),
    )
    .unwrap();
    let scheduler = config.scheduler();

    assert_eq!(scheduler.sync_basis(), Some(SyncBasis::Steps));
    assert!(!scheduler.should_sync_target(0));
    assert!(!scheduler.should_sync_target(16));
    assert!(scheduler.should_sync_target(32));
    assert!(scheduler.should_sync_target(64));
}

#[derive(Default)]
struct Recording {
    updates: Vec<u64>,
    syncs: Vec<u64>,
}

#[async_trait]
impl AgentRuntime for Recording {
    async fn observe(&mut self, _time_step: u64) -> Result<Observed, ExecutionError> {
        Ok(Observed {
            records: 1,
            episode_done: false,
        })
    }

    async fn update(&mut self, request: &UpdateRequest) -> Result<f64, ExecutionError> {
        self.updates.push(request.time_step);
        Ok(0.0)
    }

    async fn sync_target(&mut self, count: u64) -> Result<(), ExecutionError> {
        self.syncs.push(count);
        Ok(())
    }
}

#[tokio::test]
async fn test_dqn_cartpole_never_updates_but_still_syncs() {
    let config = AgentConfigResolver::default()
        .resolve_file(fixture("dqn_agent_for_cartpole.json"))
        .await
        .unwrap();
    assert_eq!(config.warnings.len(), 1);
    assert_eq!(config.warnings[0].path, "update_spec.batch_size");

    let mut driver = UpdateLoop::new(Arc::new(config), StepCounter::new(), 1000);
    let mut runtime = Recording::default();
    let stats = driver.run(&mut runtime, 64).await.unwrap();

    // Memory tops out at 32 records, short of a 48-record batch.
    assert_eq!(driver.buffered(), 32);
    assert_eq!(stats.updates, 0);
    assert!(runtime.updates.is_empty());
    assert_eq!(runtime.syncs, vec![32, 64]);
    assert_eq!(stats.syncs, 2);
}

#[test]
fn test_ppo_pong() {
    let config = AgentConfigResolver::default()
        .resolve_str(&load("ppo_agent_for_pong.json"))
        .unwrap();

    assert_eq!(config.agent_type(), AgentType::Ppo);
    assert!(config.warnings.is_empty());
    assert_eq!(config.memory.eviction(), EvictionPolicy::Fifo);
    assert_eq!(config.preprocessing.len(), 4);
    assert_eq!(config.preprocessing[3].params["sequence_length"], 4);
    assert_eq!(config.network.layers.len(), 4);
    assert_eq!(config.network.layer("conv2").unwrap().params["filters"], 32);
    assert_eq!(config.update.min_buffered, 200);

    let scheduler = config.scheduler();
    assert_eq!(scheduler.sync_basis(), None);
    assert_eq!(scheduler.iterations_for_update(), 10);
    assert_eq!(scheduler.minibatch_size(), 64);

    let ppo = config.ppo().unwrap();
    assert_relative_eq!(ppo.gae_lambda, 0.95);
    assert!(ppo.value_function.is_some());
    assert!(ppo.value_function_optimizer.is_some());
    assert!(!ppo.sample_episodes);
}

#[test]
fn test_ppo_clip_ratio_decays_from_start() {
    let config = AgentConfigResolver::default()
        .resolve_str(&load("ppo_agent_for_pong.json"))
        .unwrap();
    let ppo = config.ppo().unwrap();
    let total = 10_000;

    assert_eq!(ppo.clip_ratio_at(0, total), 0.2);
    assert_eq!(ppo.clip_ratio_at(total, total), 0.01);
    let mut previous = ppo.clip_ratio_at(0, total);
    for step in (0..=total + 500).step_by(97) {
        let value = ppo.clip_ratio_at(step, total);
        assert!(value <= previous, "clip ratio rose at step {step}");
        previous = value;
    }
}

#[test]
fn test_apex_pong_fakes_missing_gpus() {
    let resolver = AgentConfigResolver::new(
        ResolverOptions::default().with_inventory(DeviceInventory::new(1)),
    );
    let config = resolver.resolve_str(&load("apex_agent_for_pong.json")).unwrap();

    assert_eq!(config.agent_type(), AgentType::Apex);
    assert!(matches!(
        config.memory.kind,
        MemoryKind::PrioritizedReplay { alpha, beta } if alpha == 0.6 && beta == 0.4
    ));
    assert_eq!(config.memory.eviction(), EvictionPolicy::LowestPriority);
    assert_eq!(config.update.min_buffered, 50_000);
    assert_eq!(config.dqn().unwrap().n_step, 3);

    assert_eq!(config.execution.num_workers(), 2);
    assert_eq!(config.execution.fake_devices(), 1);
    let DeviceStrategy::MultiGpuSync { devices } = &config.execution.strategy else {
        panic!("expected multi_gpu_sync, got {:?}", config.execution.strategy);
    };
    assert_eq!(devices[0].name(), "/device:GPU:0");
    assert_eq!(devices[1].name(), "/device:CPU:1");

    assert_eq!(config.scheduler().sync_basis(), Some(SyncBasis::Updates));
}

#[test]
fn test_resolution_is_idempotent() {
    for name in [
        "dqn_agent_for_cartpole.json",
        "ppo_agent_for_pong.json",
        "apex_agent_for_pong.json",
    ] {
        let text = load(name);
        let resolver = AgentConfigResolver::default();
        assert_eq!(resolver.resolve_str(&text).unwrap(), resolver.resolve_str(&text).unwrap());
    }
}

#[test]
fn test_resolved_config_serializes() {
    let config = AgentConfigResolver::default()
        .resolve_str(&load("ppo_agent_for_pong.json"))
        .unwrap();
    let value = serde_json::to_value(&config).unwrap();

    assert_eq!(value["variant"]["type"], "ppo");
    assert_eq!(value["memory"]["kind"]["type"], "ring_buffer");
    assert_eq!(value["update"]["batch_size"], 200);
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let err = AgentConfigResolver::default()
        .resolve_file(fixture("no_such_agent.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
    assert_eq!(err.path(), None);
}
