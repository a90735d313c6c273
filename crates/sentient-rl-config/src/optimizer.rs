//! Optimizer specs

use serde::Serialize;
use sentient_rl_spec::{ConfigError, Result, Schedule, ScheduleSpec};

use crate::document::Section;
use crate::options::UnknownFieldPolicy;

/// Supported optimizers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Adam
    Adam,
    /// Plain stochastic gradient descent
    Sgd,
    /// RMSProp
    RmsProp,
    /// Adagrad
    Adagrad,
    /// Adadelta
    Adadelta,
}

impl OptimizerKind {
    /// Parse an optimizer name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "adam" => Some(Self::Adam),
            "sgd" | "gradient_descent" => Some(Self::Sgd),
            "rmsprop" | "rms_prop" | "rms-prop" => Some(Self::RmsProp),
            "adagrad" => Some(Self::Adagrad),
            "adadelta" => Some(Self::Adadelta),
            _ => None,
        }
    }
}

/// Resolved optimizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimizerSpec {
    /// Optimizer kind
    pub kind: OptimizerKind,
    /// Learning rate over training
    pub learning_rate: ScheduleSpec,
    /// Global gradient norm clip
    pub clip_grad_norm: Option<f64>,
}

impl OptimizerSpec {
    /// Learning rate at `step` out of `total_steps`
    #[must_use]
    pub fn learning_rate_at(&self, step: u64, total_steps: u64) -> f64 {
        self.learning_rate.value_at(step, total_steps)
    }
}

/// Resolve an optimizer section.
pub fn resolve(mut section: Section<'_>, policy: UnknownFieldPolicy) -> Result<OptimizerSpec> {
    let section_path = section.path().to_string();
    let type_path = section.path_of("type");
    let name = section.require_str("type")?;
    let kind = OptimizerKind::from_name(name)
        .ok_or_else(|| ConfigError::invalid(type_path, format!("unsupported optimizer `{name}`")))?;

    let lr_path = section.path_of("learning_rate");
    let learning_rate = section.require_schedule("learning_rate")?;
    learning_rate.require(&lr_path, "positive", |v| v > 0.0)?;

    let clip_grad_norm = section.f64("clip_grad_norm")?;
    if clip_grad_norm.is_some_and(|c| c <= 0.0) {
        return Err(ConfigError::invalid(section.path_of("clip_grad_norm"), "must be positive"));
    }

    section.finish(policy)?;
    tracing::debug!(path = %section_path, ?kind, ?learning_rate, "resolved optimizer");
    Ok(OptimizerSpec {
        kind,
        learning_rate,
        clip_grad_norm,
    })
}
