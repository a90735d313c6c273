//! Experience memory policies
//!
//! Storage itself belongs to the runtime; the resolved policy only carries
//! the kind, capacity and eviction semantics it must implement.

use serde::Serialize;
use sentient_rl_spec::{ConfigError, Result};

use crate::document::Section;
use crate::options::UnknownFieldPolicy;

/// Default priority exponent for prioritized replay
pub const DEFAULT_ALPHA: f64 = 1.0;
/// Default importance-sampling exponent for prioritized replay
pub const DEFAULT_BETA: f64 = 0.0;

/// Supported memory kinds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryKind {
    /// Uniformly sampled replay memory
    Replay,
    /// Oldest-first ring buffer
    RingBuffer,
    /// Replay sampled proportionally to priority
    PrioritizedReplay {
        /// Priority exponent
        alpha: f64,
        /// Importance-sampling exponent
        beta: f64,
    },
}

impl MemoryKind {
    /// Name as written in documents
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Replay => "replay",
            Self::RingBuffer => "ring_buffer",
            Self::PrioritizedReplay { .. } => "prioritized_replay",
        }
    }
}

/// Which record is dropped once memory is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Oldest record first
    Fifo,
    /// No ordering guarantee on eviction
    Unordered,
    /// Lowest-priority record first
    LowestPriority,
}

/// Resolved memory policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryPolicy {
    /// Memory kind
    pub kind: MemoryKind,
    /// Maximum number of stored records
    pub capacity: u64,
}

impl MemoryPolicy {
    /// Eviction semantics the runtime must implement
    #[must_use]
    pub fn eviction(&self) -> EvictionPolicy {
        match self.kind {
            MemoryKind::RingBuffer => EvictionPolicy::Fifo,
            MemoryKind::Replay => EvictionPolicy::Unordered,
            MemoryKind::PrioritizedReplay { .. } => EvictionPolicy::LowestPriority,
        }
    }

    /// Whether sampling is priority-weighted
    #[must_use]
    pub fn is_prioritized(&self) -> bool {
        matches!(self.kind, MemoryKind::PrioritizedReplay { .. })
    }

    /// Number of records held after `observed` records were inserted
    #[must_use]
    pub fn stored_after(&self, observed: u64) -> u64 {
        observed.min(self.capacity)
    }
}

/// Resolve `memory_spec`.
pub fn resolve(mut section: Section<'_>, policy: UnknownFieldPolicy) -> Result<MemoryPolicy> {
    let type_path = section.path_of("type");
    let kind = match section.require_str("type")? {
        "replay" => MemoryKind::Replay,
        "ring_buffer" => MemoryKind::RingBuffer,
        "prioritized_replay" => {
            let alpha = section.f64("alpha")?.unwrap_or(DEFAULT_ALPHA);
            if alpha < 0.0 {
                return Err(ConfigError::invalid(section.path_of("alpha"), "must be >= 0"));
            }
            let beta = section.f64("beta")?.unwrap_or(DEFAULT_BETA);
            if !(0.0..=1.0).contains(&beta) {
                return Err(ConfigError::invalid(section.path_of("beta"), "must be within [0, 1]"));
            }
            MemoryKind::PrioritizedReplay { alpha, beta }
        }
        other => {
            return Err(ConfigError::UnsupportedMemoryType {
                path: type_path,
                kind: other.to_string(),
            })
        }
    };

    let capacity_path = section.path_of("capacity");
    let capacity = match section.require("capacity")?.as_u64() {
        Some(c) if c > 0 => c,
        Some(_) => {
            return Err(ConfigError::InvalidCapacity {
                path: capacity_path,
                reason: "capacity must be greater than zero".to_string(),
            })
        }
        None => {
            return Err(ConfigError::InvalidCapacity {
                path: capacity_path,
                reason: "capacity must be a positive integer".to_string(),
            })
        }
    };

    section.finish(policy)?;

    let memory = MemoryPolicy { kind, capacity };
    tracing::debug!(kind = kind.name(), capacity, eviction = ?memory.eviction(), "resolved memory policy");
    Ok(memory)
}
