//! Time-varying hyperparameters
//!
//! A schedule is written in a document either as a bare number, as a
//! `[kind, from, to]` triple, or as an object
//! `{"type": kind, "from": .., "to": .., "start_timestep": .., "num_timesteps": ..}`.
//! Resolution turns any of these into a [`ScheduleSpec`], which is then
//! queried by step with [`Schedule::value_at`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{join_path, ConfigError, Result};

/// Trait for schedules (e.g., for epsilon decay)
pub trait Schedule: Send + Sync {
    /// Value at `step` out of `total_steps`
    fn value_at(&self, step: u64, total_steps: u64) -> f64;
}

/// Interpolation function between the start and end value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// `from + (to - from) * p`
    Linear,
    /// `to + (from - to) * (1 - p)^2`
    Polynomial,
    /// `from * (to / from)^p`
    Exponential,
}

impl ScheduleKind {
    /// Parse a kind name, accepting the `*_decay` spellings as well.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" | "linear_decay" => Some(Self::Linear),
            "polynomial" | "polynomial_decay" => Some(Self::Polynomial),
            "exponential" | "exponential_decay" => Some(Self::Exponential),
            _ => None,
        }
    }

    fn interpolate(self, from: f64, to: f64, progress: f64) -> f64 {
        match self {
            Self::Linear => from + (to - from) * progress,
            Self::Polynomial => to + (from - to) * (1.0 - progress).powi(2),
            Self::Exponential => from * (to / from).powf(progress),
        }
    }
}

/// Explicit decay window carried by object-form schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon {
    /// Step at which decay begins
    pub start_timestep: u64,
    /// Number of steps over which the value decays
    pub num_timesteps: u64,
}

/// A resolved schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Same value at every step
    Constant {
        /// The value
        value: f64,
    },
    /// Interpolates from `from` to `to` as training progresses
    Interpolated {
        /// Interpolation function
        kind: ScheduleKind,
        /// Value at progress 0
        from: f64,
        /// Value at progress 1 and beyond
        to: f64,
        /// Own decay window; when absent the caller's horizon is used
        horizon: Option<Horizon>,
    },
}

impl ScheduleSpec {
    /// Constant schedule
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self::Constant { value }
    }

    /// Linear schedule over the caller's horizon
    #[must_use]
    pub fn linear(from: f64, to: f64) -> Self {
        Self::Interpolated {
            kind: ScheduleKind::Linear,
            from,
            to,
            horizon: None,
        }
    }

    /// Value at progress 0
    #[must_use]
    pub fn initial(&self) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::Interpolated { from, .. } => from,
        }
    }

    /// Value once fully annealed
    #[must_use]
    pub fn final_value(&self) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::Interpolated { to, .. } => to,
        }
    }

    /// Smallest and largest value the schedule can take
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        let (a, b) = (self.initial(), self.final_value());
        (a.min(b), a.max(b))
    }

    /// Every supported kind is monotonic between its endpoints, so this only
    /// compares them.
    #[must_use]
    pub fn is_non_increasing(&self) -> bool {
        self.initial() >= self.final_value()
    }

    /// Fails with `InvalidValue` unless both endpoints satisfy `check`.
    pub fn require(&self, path: &str, what: &str, check: impl Fn(f64) -> bool) -> Result<()> {
        let (lo, hi) = self.bounds();
        if check(lo) && check(hi) {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                path,
                format!("schedule values [{lo}, {hi}] must be {what}"),
            ))
        }
    }
}

impl Schedule for ScheduleSpec {
    fn value_at(&self, step: u64, total_steps: u64) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::Interpolated {
                kind,
                from,
                to,
                horizon,
            } => {
                let p = match horizon {
                    Some(h) => progress(step.saturating_sub(h.start_timestep), h.num_timesteps),
                    None => progress(step, total_steps),
                };
                // Endpoints are returned as written, not recomputed.
                if p <= 0.0 {
                    from
                } else if p >= 1.0 {
                    to
                } else {
                    let (lo, hi) = (from.min(to), from.max(to));
                    kind.interpolate(from, to, p).clamp(lo, hi)
                }
            }
        }
    }
}

/// Fraction of the horizon elapsed, clamped to `[0, 1]`.
///
/// An empty horizon counts as fully annealed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress(step: u64, total_steps: u64) -> f64 {
    if total_steps == 0 {
        1.0
    } else {
        (step as f64 / total_steps as f64).clamp(0.0, 1.0)
    }
}

/// Resolve a schedule written at `path`.
pub fn resolve(value: &Value, path: &str) -> Result<ScheduleSpec> {
    let spec = match value {
        Value::Number(_) => ScheduleSpec::constant(finite(value, path)?),
        Value::Array(items) => resolve_triple(items, path)?,
        Value::Object(map) => resolve_object(map, path)?,
        _ => {
            return Err(ConfigError::invalid(
                path,
                "schedule must be a number, a [kind, from, to] triple or an object",
            ))
        }
    };
    tracing::trace!(path, ?spec, "resolved schedule");
    Ok(spec)
}

fn resolve_triple(items: &[Value], path: &str) -> Result<ScheduleSpec> {
    let [kind, from, to] = items else {
        return Err(ConfigError::invalid(
            path,
            format!("schedule triple must have 3 elements, got {}", items.len()),
        ));
    };
    let kind = kind
        .as_str()
        .ok_or_else(|| ConfigError::invalid(join_path(path, "0"), "schedule kind must be a string"))?;
    let from = finite(from, &join_path(path, "1"))?;
    let to = finite(to, &join_path(path, "2"))?;
    interpolated(kind, from, to, None, path)
}

fn resolve_object(map: &Map<String, Value>, path: &str) -> Result<ScheduleSpec> {
    const KNOWN: [&str; 6] = ["type", "value", "from", "to", "start_timestep", "num_timesteps"];
    if let Some(key) = map.keys().find(|k| !KNOWN.contains(&k.as_str())) {
        return Err(ConfigError::UnknownField {
            path: join_path(path, key),
        });
    }

    let type_path = join_path(path, "type");
    let kind = map
        .get("type")
        .ok_or_else(|| ConfigError::MissingRequiredField {
            path: type_path.clone(),
        })?
        .as_str()
        .ok_or_else(|| ConfigError::invalid(&type_path, "expected a string"))?;

    if matches!(kind, "constant" | "constant_decay") {
        let value_path = join_path(path, "value");
        let value = map
            .get("value")
            .ok_or(ConfigError::MissingRequiredField { path: value_path.clone() })?;
        return Ok(ScheduleSpec::constant(finite(value, &value_path)?));
    }

    let number = |key: &str| -> Result<f64> {
        let field = join_path(path, key);
        map.get(key)
            .ok_or_else(|| ConfigError::MissingRequiredField { path: field.clone() })
            .and_then(|v| finite(v, &field))
    };
    let from = number("from")?;
    let to = number("to")?;

    let horizon = match map.get("num_timesteps") {
        None if map.contains_key("start_timestep") => {
            return Err(ConfigError::InconsistentFields {
                path: join_path(path, "start_timestep"),
                reason: "start_timestep needs num_timesteps to form a horizon".to_string(),
            })
        }
        None => None,
        Some(steps) => {
            let num_timesteps = positive_interval(steps, &join_path(path, "num_timesteps"))?;
            let start_timestep = match map.get("start_timestep") {
                None => 0,
                Some(v) => v.as_u64().ok_or_else(|| {
                    ConfigError::invalid(join_path(path, "start_timestep"), "expected a non-negative integer")
                })?,
            };
            Some(Horizon {
                start_timestep,
                num_timesteps,
            })
        }
    };
    interpolated(kind, from, to, horizon, path)
}

fn interpolated(
    kind_name: &str,
    from: f64,
    to: f64,
    horizon: Option<Horizon>,
    path: &str,
) -> Result<ScheduleSpec> {
    if matches!(kind_name, "constant" | "constant_decay") {
        return if (from - to).abs() <= f64::EPSILON * from.abs().max(1.0) {
            Ok(ScheduleSpec::constant(from))
        } else {
            Err(ConfigError::invalid(path, "constant schedule needs equal from and to"))
        };
    }

    let kind = ScheduleKind::from_name(kind_name).ok_or_else(|| ConfigError::UnknownScheduleKind {
        path: path.to_string(),
        kind: kind_name.to_string(),
    })?;

    if kind == ScheduleKind::Exponential && (from == 0.0 || to == 0.0 || from.signum() != to.signum()) {
        return Err(ConfigError::invalid(
            path,
            "exponential schedule needs non-zero endpoints of the same sign",
        ));
    }

    Ok(ScheduleSpec::Interpolated {
        kind,
        from,
        to,
        horizon,
    })
}

fn finite(value: &Value, path: &str) -> Result<f64> {
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(ConfigError::invalid(path, format!("value {v} is not finite"))),
        None => Err(ConfigError::invalid(path, "expected a number")),
    }
}

/// Reads a strictly positive integer, failing with `InvalidInterval`.
pub fn positive_interval(value: &Value, path: &str) -> Result<u64> {
    match value.as_u64() {
        Some(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::InvalidInterval {
            path: path.to_string(),
            value: value.to_string(),
        }),
    }
}
