//! Epsilon-greedy exploration

use serde::Serialize;
use sentient_rl_spec::{ConfigError, Result, Schedule, ScheduleSpec};

use crate::document::Section;
use crate::options::UnknownFieldPolicy;

/// Resolved exploration spec
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExplorationSpec {
    /// Probability of taking a random action
    pub epsilon: ScheduleSpec,
}

impl ExplorationSpec {
    /// Epsilon at `step` out of `total_steps`
    #[must_use]
    pub fn epsilon_at(&self, step: u64, total_steps: u64) -> f64 {
        self.epsilon.value_at(step, total_steps)
    }
}

/// Resolve `exploration_spec`.
///
/// `epsilon_spec` may hold the schedule directly or wrap it in a
/// `decay_spec` object.
pub fn resolve(mut section: Section<'_>, policy: UnknownFieldPolicy) -> Result<ExplorationSpec> {
    let epsilon_path = section.path_of("epsilon_spec");
    let raw = section.require("epsilon_spec")?;

    let epsilon = if raw.get("decay_spec").is_some() {
        let mut wrapper = Section::new(raw, epsilon_path.as_str())?;
        let decay = wrapper.require_schedule("decay_spec")?;
        wrapper.finish(policy)?;
        decay
    } else {
        sentient_rl_spec::schedule::resolve(raw, &epsilon_path)?
    };
    section.finish(policy)?;

    epsilon.require(&epsilon_path, "within [0, 1]", |v| (0.0..=1.0).contains(&v))?;
    if !epsilon.is_non_increasing() {
        return Err(ConfigError::invalid(
            epsilon_path,
            format!(
                "epsilon must not increase over training (from {} to {})",
                epsilon.initial(),
                epsilon.final_value()
            ),
        ));
    }

    tracing::debug!(?epsilon, "resolved exploration");
    Ok(ExplorationSpec { epsilon })
}
