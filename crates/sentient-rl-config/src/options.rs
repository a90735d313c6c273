//! Resolver configuration

use serde::{Deserialize, Serialize};

use crate::execution::DeviceInventory;

/// What to do with fields a section does not recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFieldPolicy {
    /// Fail with `UnknownField`
    #[default]
    Reject,
    /// Log at debug level and drop the field
    Ignore,
}

/// What to do when `batch_size` exceeds the memory capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCapacityPolicy {
    /// Record a warning on the resolved config
    #[default]
    Warn,
    /// Fail with `InconsistentFields`
    Reject,
}

/// Options controlling how strictly documents are resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverOptions {
    /// Policy for unrecognized fields
    #[serde(default)]
    pub unknown_fields: UnknownFieldPolicy,
    /// Policy for batches larger than memory
    #[serde(default)]
    pub batch_capacity: BatchCapacityPolicy,
    /// Devices the runtime can provide
    #[serde(default)]
    pub inventory: DeviceInventory,
}

impl ResolverOptions {
    /// Set the unknown-field policy
    #[must_use]
    pub fn with_unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Set the batch/capacity policy
    #[must_use]
    pub fn with_batch_capacity(mut self, policy: BatchCapacityPolicy) -> Self {
        self.batch_capacity = policy;
        self
    }

    /// Set the device inventory
    #[must_use]
    pub fn with_inventory(mut self, inventory: DeviceInventory) -> Self {
        self.inventory = inventory;
        self
    }
}
