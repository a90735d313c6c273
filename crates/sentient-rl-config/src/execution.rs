//! Execution strategy: seeding and device placement
//!
//! Nothing here touches hardware. The available GPU count is injected via
//! [`DeviceInventory`] and the output is a plan the runtime allocates from.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sentient_rl_spec::{ConfigError, Result};

use crate::document::Section;
use crate::options::UnknownFieldPolicy;

/// Environment variable overriding the detected GPU count
pub const AVAILABLE_GPUS_ENV: &str = "SENTIENT_RL_AVAILABLE_GPUS";

/// GPUs the runtime reports as usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceInventory {
    /// Number of physical GPUs
    pub available_gpus: usize,
}

impl DeviceInventory {
    /// Inventory with `available_gpus` devices
    #[must_use]
    pub fn new(available_gpus: usize) -> Self {
        Self { available_gpus }
    }

    /// Read the inventory from `SENTIENT_RL_AVAILABLE_GPUS`, falling back to
    /// the entries of `CUDA_VISIBLE_DEVICES`. Neither set means no GPUs.
    #[must_use]
    pub fn from_env() -> Self {
        if let Ok(count) = std::env::var(AVAILABLE_GPUS_ENV) {
            match count.trim().parse() {
                Ok(available_gpus) => return Self { available_gpus },
                Err(_) => tracing::warn!(value = %count, "ignoring malformed {AVAILABLE_GPUS_ENV}"),
            }
        }
        let available_gpus = std::env::var("CUDA_VISIBLE_DEVICES")
            .map(|v| count_visible_devices(&v))
            .unwrap_or(0);
        tracing::debug!(available_gpus, "device inventory from environment");
        Self { available_gpus }
    }
}

/// Number of devices listed in a `CUDA_VISIBLE_DEVICES` value.
///
/// An invalid index hides itself and every device after it.
#[must_use]
pub fn count_visible_devices(value: &str) -> usize {
    value
        .split(',')
        .map(str::trim)
        .take_while(|d| !d.is_empty() && !d.starts_with('-'))
        .count()
}

/// Seed for downstream randomness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Seed {
    /// Reproducible runs
    Fixed(u64),
    /// The document asked for no seed
    Unseeded,
}

impl Seed {
    /// Seeded generator, or `None` when unseeded
    #[must_use]
    pub fn rng(&self) -> Option<StdRng> {
        match self {
            Self::Fixed(seed) => Some(StdRng::seed_from_u64(*seed)),
            Self::Unseeded => None,
        }
    }

    /// Seed for the `worker`-th parallel worker
    #[must_use]
    pub fn for_worker(&self, worker: u64) -> Seed {
        match self {
            Self::Fixed(seed) => Self::Fixed(seed.wrapping_add(worker)),
            Self::Unseeded => Self::Unseeded,
        }
    }
}

/// One device slot in a multi-GPU plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSlot {
    /// Position in the tower list
    pub index: usize,
    /// Placeholder standing in for a missing GPU
    pub fake: bool,
}

impl DeviceSlot {
    /// Device name handed to the runtime
    #[must_use]
    pub fn name(&self) -> String {
        if self.fake {
            format!("/device:CPU:{}", self.index)
        } else {
            format!("/device:GPU:{}", self.index)
        }
    }
}

/// How computation is spread over devices
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DeviceStrategy {
    /// Everything on one device
    Single,
    /// Synchronous data-parallel towers, one per slot
    MultiGpuSync {
        /// Tower devices
        devices: Vec<DeviceSlot>,
    },
    /// Explicit scope to device mapping
    Custom {
        /// Scope → device name
        device_map: IndexMap<String, String>,
    },
}

/// Resolved execution plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    /// Seed for downstream randomness
    pub seed: Seed,
    /// Device strategy
    pub strategy: DeviceStrategy,
    /// Device for anything not otherwise placed
    pub default_device: Option<String>,
    /// Opaque session options for the runtime
    pub session_config: Map<String, Value>,
    /// Turn off summaries and monitoring
    pub disable_monitoring: bool,
    /// Collect runtime profiles
    pub enable_profiler: bool,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self {
            seed: Seed::Unseeded,
            strategy: DeviceStrategy::Single,
            default_device: None,
            session_config: Map::new(),
            disable_monitoring: false,
            enable_profiler: false,
        }
    }
}

impl ExecutionPlan {
    /// Number of parallel workers the plan asks for
    #[must_use]
    pub fn num_workers(&self) -> usize {
        match &self.strategy {
            DeviceStrategy::MultiGpuSync { devices } => devices.len(),
            DeviceStrategy::Single | DeviceStrategy::Custom { .. } => 1,
        }
    }

    /// Number of placeholder devices in the plan
    #[must_use]
    pub fn fake_devices(&self) -> usize {
        match &self.strategy {
            DeviceStrategy::MultiGpuSync { devices } => devices.iter().filter(|d| d.fake).count(),
            DeviceStrategy::Single | DeviceStrategy::Custom { .. } => 0,
        }
    }
}

/// Resolve `execution_spec`; absent means single device, unseeded.
pub fn resolve(
    section: Option<Section<'_>>,
    inventory: DeviceInventory,
    policy: UnknownFieldPolicy,
) -> Result<ExecutionPlan> {
    let Some(mut section) = section else {
        return Ok(ExecutionPlan::default());
    };

    let seed = match section.get("seed") {
        None => Seed::Unseeded,
        Some(v) => Seed::Fixed(v.as_u64().ok_or_else(|| {
            ConfigError::invalid(section.path_of("seed"), "seed must be a non-negative integer")
        })?),
    };

    let strategy_path = section.path_of("device_strategy");
    let strategy = match section.str("device_strategy")?.unwrap_or("single") {
        "single" | "default" => {
            // gpu_spec is accepted but has no effect outside multi_gpu_sync.
            section.get("gpu_spec");
            DeviceStrategy::Single
        }
        "multi_gpu_sync" => {
            let gpu_spec = section.section("gpu_spec")?;
            let gpu_path = section.path_of("gpu_spec");
            multi_gpu(gpu_spec, &gpu_path, inventory, policy)?
        }
        "custom" => {
            section.get("gpu_spec");
            let map_path = section.path_of("device_map");
            let mut raw = section.require_section("device_map")?;
            let mut device_map = IndexMap::new();
            for (scope, device) in raw.take_rest() {
                let device = device.as_str().ok_or_else(|| {
                    ConfigError::invalid(format!("{map_path}.{scope}"), "device must be a string")
                })?;
                device_map.insert(scope, device.to_string());
            }
            if device_map.is_empty() {
                return Err(ConfigError::invalid(map_path, "custom strategy needs at least one entry"));
            }
            DeviceStrategy::Custom { device_map }
        }
        other => {
            return Err(ConfigError::invalid(
                strategy_path,
                format!("unsupported device strategy `{other}`"),
            ))
        }
    };

    let default_device = section.str("default_device")?.map(str::to_string);
    let session_config = match section.section("session_config")? {
        Some(mut s) => s.take_rest(),
        None => Map::new(),
    };
    let disable_monitoring = section.bool("disable_monitoring")?.unwrap_or(false);
    let enable_profiler = section.bool("enable_profiler")?.unwrap_or(false);
    section.finish(policy)?;

    let plan = ExecutionPlan {
        seed,
        strategy,
        default_device,
        session_config,
        disable_monitoring,
        enable_profiler,
    };
    tracing::debug!(
        seed = ?plan.seed,
        workers = plan.num_workers(),
        fake_devices = plan.fake_devices(),
        "resolved execution plan"
    );
    Ok(plan)
}

fn multi_gpu(
    gpu_spec: Option<Section<'_>>,
    path: &str,
    inventory: DeviceInventory,
    policy: UnknownFieldPolicy,
) -> Result<DeviceStrategy> {
    let Some(mut gpu_spec) = gpu_spec else {
        return Err(ConfigError::InsufficientDevices {
            path: path.to_string(),
            reason: "multi_gpu_sync requires a gpu_spec".to_string(),
        });
    };

    let gpus_enabled = gpu_spec.bool("gpus_enabled")?.unwrap_or(false);
    let max_usable_gpus = gpu_spec.u64("max_usable_gpus")?.unwrap_or(0);
    let fake_if_necessary = gpu_spec.bool("fake_gpus_if_necessary")?.unwrap_or(false);
    gpu_spec.finish(policy)?;

    if !gpus_enabled {
        return Err(ConfigError::InsufficientDevices {
            path: format!("{path}.gpus_enabled"),
            reason: "multi_gpu_sync requires gpus_enabled = true".to_string(),
        });
    }
    if max_usable_gpus == 0 {
        return Err(ConfigError::InsufficientDevices {
            path: format!("{path}.max_usable_gpus"),
            reason: "multi_gpu_sync requires max_usable_gpus >= 1".to_string(),
        });
    }

    let requested = usize::try_from(max_usable_gpus).map_err(|_| {
        ConfigError::invalid(format!("{path}.max_usable_gpus"), "too many devices requested")
    })?;
    let physical = requested.min(inventory.available_gpus);
    if physical < requested && !fake_if_necessary {
        return Err(ConfigError::InsufficientDevices {
            path: format!("{path}.max_usable_gpus"),
            reason: format!(
                "requested {requested} GPUs but only {} available and fake_gpus_if_necessary is false",
                inventory.available_gpus
            ),
        });
    }
    if physical < requested {
        tracing::warn!(requested, physical, "substituting fake devices for missing GPUs");
    }

    let devices = (0..requested)
        .map(|index| DeviceSlot {
            index,
            fake: index >= physical,
        })
        .collect();
    Ok(DeviceStrategy::MultiGpuSync { devices })
}
