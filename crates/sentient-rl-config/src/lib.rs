//! Agent configuration resolution for SentientOS RL agents
//!
//! This crate turns a declarative JSON agent document into a validated,
//! immutable [`AgentConfig`]:
//! - Memory policy (replay, ring buffer, prioritized replay)
//! - Update cadence and target network sync
//! - Device strategy and seeding
//! - DQN, Ape-X and PPO specific settings
//!
//! It also ships the [`UpdateLoop`] that drives a resolved config against an
//! [`AgentRuntime`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod counter;
pub mod document;
pub mod driver;
pub mod execution;
pub mod exploration;
pub mod memory;
pub mod network;
pub mod optimizer;
pub mod options;
pub mod resolver;
pub mod update;

// Re-export the resolved config
pub use agent::{AgentConfig, AgentType, AgentVariant, ConfigWarning, DqnSettings, PpoSettings};
pub use resolver::{resolve, AgentConfigResolver};

// Re-export section types
pub use execution::{DeviceInventory, DeviceSlot, DeviceStrategy, ExecutionPlan, Seed};
pub use memory::{EvictionPolicy, MemoryKind, MemoryPolicy};
pub use options::{BatchCapacityPolicy, ResolverOptions, UnknownFieldPolicy};
pub use update::{SchedulerState, SyncBasis, UpdateMode, UpdatePolicy, UpdateScheduler};

// Re-export the driver
pub use counter::{StepCounter, StepSnapshot};
pub use driver::{AgentRuntime, LoopStats, Observed, UpdateLoop, UpdateRequest};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AgentConfig, AgentConfigResolver, AgentRuntime, AgentType, ResolverOptions, StepCounter,
        UpdateLoop, UpdateScheduler,
    };
    pub use sentient_rl_spec::prelude::*;
}
