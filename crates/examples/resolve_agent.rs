//! Example: resolve an agent document and drive its update schedule
//!
//! Run with: cargo run --example resolve_agent -- [path/to/agent.json] [steps]

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sentient_rl_config::prelude::*;
use sentient_rl_config::{DeviceInventory, Observed, UpdateRequest};
use tracing_subscriber::EnvFilter;

/// Stand-in runtime with random episode lengths and losses
struct SimulatedRuntime {
    rng: StdRng,
    episode_length: u64,
    steps_in_episode: u64,
}

#[async_trait]
impl AgentRuntime for SimulatedRuntime {
    async fn observe(&mut self, _time_step: u64) -> Result<Observed, ExecutionError> {
        self.steps_in_episode += 1;
        let episode_done = self.steps_in_episode >= self.episode_length;
        if episode_done {
            self.steps_in_episode = 0;
            self.episode_length = self.rng.gen_range(10..200);
        }
        Ok(Observed {
            records: 1,
            episode_done,
        })
    }

    async fn update(&mut self, request: &UpdateRequest) -> Result<f64, ExecutionError> {
        let loss = self.rng.gen_range(0.0..1.0) * request.learning_rate * 100.0;
        println!(
            "  step {:>6}: update with batch {} x {} pass(es), lr {:.6}, loss {:.4}",
            request.time_step, request.batch_size, request.iterations, request.learning_rate, loss
        );
        Ok(loss)
    }

    async fn sync_target(&mut self, count: u64) -> Result<(), ExecutionError> {
        println!("  target network synced at count {count}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| {
        format!(
            "{}/configs/dqn_agent_for_cartpole.json",
            env!("CARGO_MANIFEST_DIR")
        )
    });
    let steps: u64 = args.next().map(|s| s.parse::<u64>()).transpose()?.unwrap_or(500);

    let resolver = AgentConfigResolver::new(ResolverOptions::default().with_inventory(DeviceInventory::from_env()));
    let config = resolver.resolve_file(&path).await?;

    println!("Resolved {} agent from {path}", config.agent_type().as_str());
    println!("  memory: {} (capacity {})", config.memory.kind.name(), config.memory.capacity);
    println!(
        "  updates: every {} step(s), batch {}, waits for {} record(s)",
        config.update.update_interval, config.update.batch_size, config.update.min_buffered
    );
    println!("  workers: {}", config.execution.num_workers());
    for warning in &config.warnings {
        println!("  warning at {}: {}", warning.path, warning.message);
    }

    let rng = config.execution.seed.rng().unwrap_or_else(StdRng::from_entropy);
    let mut runtime = SimulatedRuntime {
        rng,
        episode_length: 50,
        steps_in_episode: 0,
    };

    let counter = StepCounter::new();
    let mut driver = UpdateLoop::new(Arc::new(config), counter.clone(), steps);
    let stats = driver.run(&mut runtime, steps).await?;

    println!(
        "\nRan {} step(s) over {} episode(s): {} update(s), {} target sync(s)",
        stats.steps,
        counter.episodes(),
        stats.updates,
        stats.syncs
    );
    Ok(())
}
