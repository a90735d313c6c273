//! Resolved agent configuration
//!
//! [`AgentConfig`] is the single immutable value handed to the agent
//! runtime. Type-specific settings live in [`AgentVariant`], so a DQN
//! config cannot carry PPO fields and vice versa.

use serde::Serialize;
use sentient_rl_spec::{Schedule, ScheduleSpec};

use crate::execution::ExecutionPlan;
use crate::exploration::ExplorationSpec;
use crate::memory::MemoryPolicy;
use crate::network::{NetworkSpec, PreprocessorSpec};
use crate::optimizer::OptimizerSpec;
use crate::update::{SyncBasis, UpdateFamily, UpdatePolicy, UpdateScheduler};

/// Supported agent types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Deep Q-Network
    Dqn,
    /// Distributed prioritized DQN
    Apex,
    /// Proximal Policy Optimization
    Ppo,
}

impl AgentType {
    /// Parse the document's `type` field
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dqn" | "dqn_agent" => Some(Self::Dqn),
            "apex" | "apex_agent" => Some(Self::Apex),
            "ppo" | "ppo_agent" => Some(Self::Ppo),
            _ => None,
        }
    }

    /// Canonical name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dqn => "dqn",
            Self::Apex => "apex",
            Self::Ppo => "ppo",
        }
    }

    /// Top-level fields only this type may use
    #[must_use]
    pub fn own_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Dqn | Self::Apex => DQN_FIELDS,
            Self::Ppo => PPO_FIELDS,
        }
    }

    /// Top-level fields that belong to other types
    #[must_use]
    pub fn foreign_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Dqn | Self::Apex => PPO_FIELDS,
            Self::Ppo => DQN_FIELDS,
        }
    }

    /// Update fields this type uses
    #[must_use]
    pub fn update_family(&self) -> UpdateFamily {
        match self {
            Self::Dqn => UpdateFamily::TargetSync(SyncBasis::Steps),
            // Ape-X learners sync on updates performed, not on samples seen.
            Self::Apex => UpdateFamily::TargetSync(SyncBasis::Updates),
            Self::Ppo => UpdateFamily::Iterative,
        }
    }

    /// Default discount factor
    #[must_use]
    pub fn default_discount(&self) -> f64 {
        0.98
    }
}

const DQN_FIELDS: &[&str] = &["dueling_q", "double_q", "huber_loss", "n_step", "exploration_spec"];

const PPO_FIELDS: &[&str] = &[
    "clip_ratio",
    "gae_lambda",
    "weight_entropy",
    "standardize_advantages",
    "sample_episodes",
    "value_function_spec",
    "value_function_optimizer_spec",
];

/// Settings shared by DQN and Ape-X
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DqnSettings {
    /// Separate value and advantage streams
    pub dueling_q: bool,
    /// Select next actions with the online network
    pub double_q: bool,
    /// Huber instead of squared loss
    pub huber_loss: bool,
    /// Steps of bootstrapping
    pub n_step: u64,
    /// Epsilon-greedy exploration; `None` acts greedily
    pub exploration: Option<ExplorationSpec>,
}

impl Default for DqnSettings {
    fn default() -> Self {
        Self {
            dueling_q: true,
            double_q: true,
            huber_loss: false,
            n_step: 1,
            exploration: None,
        }
    }
}

/// PPO settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PpoSettings {
    /// Likelihood ratio clip over training
    pub clip_ratio: ScheduleSpec,
    /// GAE lambda
    pub gae_lambda: f64,
    /// Entropy bonus weight
    pub weight_entropy: Option<ScheduleSpec>,
    /// Normalize advantages per batch
    pub standardize_advantages: bool,
    /// Sample whole episodes instead of time steps
    pub sample_episodes: bool,
    /// Separate value network
    pub value_function: Option<NetworkSpec>,
    /// Optimizer for the value network
    pub value_function_optimizer: Option<OptimizerSpec>,
}

impl Default for PpoSettings {
    fn default() -> Self {
        Self {
            clip_ratio: ScheduleSpec::constant(0.2),
            gae_lambda: 1.0,
            weight_entropy: None,
            standardize_advantages: false,
            sample_episodes: true,
            value_function: None,
            value_function_optimizer: None,
        }
    }
}

impl PpoSettings {
    /// Clip ratio at `step` out of `total_steps`
    #[must_use]
    pub fn clip_ratio_at(&self, step: u64, total_steps: u64) -> f64 {
        self.clip_ratio.value_at(step, total_steps)
    }
}

/// Type-specific part of an agent config
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentVariant {
    /// DQN
    Dqn(DqnSettings),
    /// Ape-X
    Apex(DqnSettings),
    /// PPO
    Ppo(PpoSettings),
}

impl AgentVariant {
    /// Agent type of this variant
    #[must_use]
    pub fn agent_type(&self) -> AgentType {
        match self {
            Self::Dqn(_) => AgentType::Dqn,
            Self::Apex(_) => AgentType::Apex,
            Self::Ppo(_) => AgentType::Ppo,
        }
    }
}

/// A warning-level inconsistency found during resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    /// Field path
    pub path: String,
    /// What is inconsistent
    pub message: String,
}

/// Fully resolved agent configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    /// Type-specific settings
    pub variant: AgentVariant,
    /// Discount factor
    pub discount: f64,
    /// Experience memory
    pub memory: MemoryPolicy,
    /// Preprocessor stack
    pub preprocessing: Vec<PreprocessorSpec>,
    /// Policy network
    pub network: NetworkSpec,
    /// Policy optimizer
    pub optimizer: OptimizerSpec,
    /// Device and seeding plan
    pub execution: ExecutionPlan,
    /// Update cadence
    pub update: UpdatePolicy,
    /// Inconsistencies that did not fail resolution
    pub warnings: Vec<ConfigWarning>,
}

impl AgentConfig {
    /// Agent type
    #[must_use]
    pub fn agent_type(&self) -> AgentType {
        self.variant.agent_type()
    }

    /// Scheduler for this config's update policy
    #[must_use]
    pub fn scheduler(&self) -> UpdateScheduler {
        UpdateScheduler::new(self.update)
    }

    /// DQN/Ape-X settings
    #[must_use]
    pub fn dqn(&self) -> Option<&DqnSettings> {
        match &self.variant {
            AgentVariant::Dqn(s) | AgentVariant::Apex(s) => Some(s),
            AgentVariant::Ppo(_) => None,
        }
    }

    /// PPO settings
    #[must_use]
    pub fn ppo(&self) -> Option<&PpoSettings> {
        match &self.variant {
            AgentVariant::Ppo(s) => Some(s),
            AgentVariant::Dqn(_) | AgentVariant::Apex(_) => None,
        }
    }

    /// Policy learning rate at `step` out of `total_steps`
    #[must_use]
    pub fn learning_rate_at(&self, step: u64, total_steps: u64) -> f64 {
        self.optimizer.learning_rate_at(step, total_steps)
    }
}
