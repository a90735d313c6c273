//! Top-level agent document resolution
//!
//! Resolution is one synchronous pass: dispatch on `type`, resolve every
//! section, cross-check them, and either return a complete [`AgentConfig`]
//! or the first error found. Nothing partially resolved escapes.

use std::path::Path;

use serde_json::Value;
use sentient_rl_spec::{ConfigError, Result};

use crate::agent::{AgentConfig, AgentType, AgentVariant, ConfigWarning, DqnSettings, PpoSettings};
use crate::document::Section;
use crate::memory::{self, MemoryKind, MemoryPolicy};
use crate::network;
use crate::options::{BatchCapacityPolicy, ResolverOptions};
use crate::update::UpdatePolicy;
use crate::{execution, exploration, optimizer, update};

/// Resolves agent documents under a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct AgentConfigResolver {
    options: ResolverOptions,
}

impl AgentConfigResolver {
    /// Resolver with `options`
    #[must_use]
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve a JSON document held in memory.
    pub fn resolve_str(&self, text: &str) -> Result<AgentConfig> {
        let document: Value = serde_json::from_str(text)?;
        self.resolve(&document)
    }

    /// Read and resolve a JSON document from disk.
    pub async fn resolve_file(&self, path: impl AsRef<Path>) -> Result<AgentConfig> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        tracing::debug!(path = %path.display(), "loaded agent document");
        self.resolve_str(&text)
    }

    /// Resolve a parsed document.
    pub fn resolve(&self, document: &Value) -> Result<AgentConfig> {
        let policy = self.options.unknown_fields;
        let mut root = Section::new(document, "")?;

        let type_name = root.require_str("type")?;
        let agent_type = AgentType::from_name(type_name).ok_or_else(|| ConfigError::UnsupportedAgentType {
            path: "type".to_string(),
            agent_type: type_name.to_string(),
        })?;
        root.forbid(agent_type.foreign_fields(), agent_type.as_str())?;

        let memory = memory::resolve(root.require_section("memory_spec")?, policy)?;
        let preprocessing = network::resolve_preprocessing(root.get("preprocessing_spec"), "preprocessing_spec")?;
        let network = network::resolve_network(root.require("network_spec")?, "network_spec")?;
        let optimizer = optimizer::resolve(root.require_section("optimizer_spec")?, policy)?;
        let execution = execution::resolve(root.section("execution_spec")?, self.options.inventory, policy)?;

        let observe_buffer_size = match root.section("observe_spec")? {
            Some(mut observe) => {
                let size = observe.u64("buffer_size")?;
                observe.finish(policy)?;
                size
            }
            None => None,
        };
        let update = update::resolve(
            root.require_section("update_spec")?,
            agent_type.update_family(),
            agent_type.as_str(),
            observe_buffer_size,
            policy,
        )?;

        let discount = match root.f64("discount")? {
            Some(d) if (0.0..=1.0).contains(&d) => d,
            Some(_) => return Err(ConfigError::invalid("discount", "discount must be within [0, 1]")),
            None => agent_type.default_discount(),
        };

        let variant = match agent_type {
            AgentType::Dqn => AgentVariant::Dqn(self.dqn_settings(&mut root)?),
            AgentType::Apex => {
                if !memory.is_prioritized() {
                    return Err(ConfigError::InconsistentFields {
                        path: "memory_spec.type".to_string(),
                        reason: format!("apex requires prioritized_replay memory, got {}", memory.kind.name()),
                    });
                }
                AgentVariant::Apex(self.dqn_settings(&mut root)?)
            }
            AgentType::Ppo => AgentVariant::Ppo(self.ppo_settings(&mut root)?),
        };
        root.finish(policy)?;

        let warnings = self.cross_validate(&memory, &update, observe_buffer_size)?;
        for warning in &warnings {
            tracing::warn!(path = %warning.path, "{}", warning.message);
        }

        let config = AgentConfig {
            variant,
            discount,
            memory,
            preprocessing,
            network,
            optimizer,
            execution,
            update,
            warnings,
        };
        tracing::info!(
            agent_type = agent_type.as_str(),
            memory = config.memory.kind.name(),
            capacity = config.memory.capacity,
            workers = config.execution.num_workers(),
            warnings = config.warnings.len(),
            "resolved agent config"
        );
        Ok(config)
    }

    fn dqn_settings(&self, root: &mut Section<'_>) -> Result<DqnSettings> {
        let defaults = DqnSettings::default();
        let n_step = root.interval("n_step")?.unwrap_or(defaults.n_step);
        let exploration = root
            .section("exploration_spec")?
            .map(|s| exploration::resolve(s, self.options.unknown_fields))
            .transpose()?;
        Ok(DqnSettings {
            dueling_q: root.bool("dueling_q")?.unwrap_or(defaults.dueling_q),
            double_q: root.bool("double_q")?.unwrap_or(defaults.double_q),
            huber_loss: root.bool("huber_loss")?.unwrap_or(defaults.huber_loss),
            n_step,
            exploration,
        })
    }

    fn ppo_settings(&self, root: &mut Section<'_>) -> Result<PpoSettings> {
        let policy = self.options.unknown_fields;
        let defaults = PpoSettings::default();

        let clip_ratio = root.schedule("clip_ratio")?.unwrap_or(defaults.clip_ratio);
        clip_ratio.require("clip_ratio", "within (0, 1]", |v| v > 0.0 && v <= 1.0)?;

        let gae_lambda = root.f64("gae_lambda")?.unwrap_or(defaults.gae_lambda);
        if !(0.0..=1.0).contains(&gae_lambda) {
            return Err(ConfigError::invalid("gae_lambda", "gae_lambda must be within [0, 1]"));
        }

        let weight_entropy = root.schedule("weight_entropy")?;
        if let Some(w) = &weight_entropy {
            w.require("weight_entropy", "non-negative", |v| v >= 0.0)?;
        }

        let value_function = root
            .get("value_function_spec")
            .map(|v| network::resolve_network(v, "value_function_spec"))
            .transpose()?;
        let value_function_optimizer = root
            .section("value_function_optimizer_spec")?
            .map(|s| optimizer::resolve(s, policy))
            .transpose()?;
        if value_function_optimizer.is_some() && value_function.is_none() {
            return Err(ConfigError::InconsistentFields {
                path: "value_function_optimizer_spec".to_string(),
                reason: "value function optimizer given without value_function_spec".to_string(),
            });
        }

        Ok(PpoSettings {
            clip_ratio,
            gae_lambda,
            weight_entropy,
            standardize_advantages: root
                .bool("standardize_advantages")?
                .unwrap_or(defaults.standardize_advantages),
            sample_episodes: root.bool("sample_episodes")?.unwrap_or(defaults.sample_episodes),
            value_function,
            value_function_optimizer,
        })
    }

    fn cross_validate(
        &self,
        memory: &MemoryPolicy,
        update: &UpdatePolicy,
        observe_buffer_size: Option<u64>,
    ) -> Result<Vec<ConfigWarning>> {
        let mut warnings = Vec::new();

        if update.batch_size > memory.capacity {
            let reason = format!(
                "batch_size {} exceeds memory capacity {}; a full batch can never be stored",
                update.batch_size, memory.capacity
            );
            match self.options.batch_capacity {
                BatchCapacityPolicy::Reject => {
                    return Err(ConfigError::InconsistentFields {
                        path: "update_spec.batch_size".to_string(),
                        reason,
                    })
                }
                BatchCapacityPolicy::Warn => warnings.push(ConfigWarning {
                    path: "update_spec.batch_size".to_string(),
                    message: reason,
                }),
            }
        }

        if update.min_buffered > memory.capacity && update.min_buffered > update.batch_size {
            warnings.push(ConfigWarning {
                path: "update_spec".to_string(),
                message: format!(
                    "updates wait for {} buffered records but memory holds at most {}; updates will never fire",
                    update.min_buffered, memory.capacity
                ),
            });
        }

        if matches!(memory.kind, MemoryKind::RingBuffer) && update.update_interval > memory.capacity {
            warnings.push(ConfigWarning {
                path: "update_spec.update_interval".to_string(),
                message: format!(
                    "update_interval {} exceeds ring buffer capacity {}; records are overwritten before they are learned from",
                    update.update_interval, memory.capacity
                ),
            });
        }

        if let Some(size) = observe_buffer_size.filter(|&size| size > update.update_interval) {
            warnings.push(ConfigWarning {
                path: "observe_spec.buffer_size".to_string(),
                message: format!(
                    "observe buffer_size {size} exceeds update_interval {}; updates run before the buffer is flushed",
                    update.update_interval
                ),
            });
        }

        Ok(warnings)
    }
}

/// Resolve `document` with default options.
pub fn resolve(document: &Value) -> Result<AgentConfig> {
    AgentConfigResolver::default().resolve(document)
}
