//! Error types for agent document resolution

use thiserror::Error;

/// Error raised while resolving an agent document.
///
/// Field-level variants carry the dotted path of the offending field
/// (for example `update_spec.sync_interval`).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Schedule kind is not a recognized interpolation function
    #[error("{path}: unknown schedule kind `{kind}`")]
    UnknownScheduleKind {
        /// Field path
        path: String,
        /// Kind as written in the document
        kind: String,
    },

    /// Memory type is not supported
    #[error("{path}: unsupported memory type `{kind}`")]
    UnsupportedMemoryType {
        /// Field path
        path: String,
        /// Type as written in the document
        kind: String,
    },

    /// Memory capacity is missing, non-integer or not positive
    #[error("{path}: invalid capacity: {reason}")]
    InvalidCapacity {
        /// Field path
        path: String,
        /// Why the capacity was rejected
        reason: String,
    },

    /// An interval is not a positive integer
    #[error("{path}: interval must be a positive integer, got {value}")]
    InvalidInterval {
        /// Field path
        path: String,
        /// Offending value, rendered from the document
        value: String,
    },

    /// Requested devices cannot be provided
    #[error("{path}: insufficient devices: {reason}")]
    InsufficientDevices {
        /// Field path
        path: String,
        /// Why the request cannot be satisfied
        reason: String,
    },

    /// A required field is absent
    #[error("{path}: missing required field")]
    MissingRequiredField {
        /// Field path
        path: String,
    },

    /// A field belongs to another agent type
    #[error("{path}: field is not allowed for agent type `{agent_type}`")]
    IncompatibleFieldForAgentType {
        /// Field path
        path: String,
        /// Agent type of the document
        agent_type: String,
    },

    /// The `type` field names an agent that is not supported
    #[error("{path}: unsupported agent type `{agent_type}`")]
    UnsupportedAgentType {
        /// Field path
        path: String,
        /// Agent type as written in the document
        agent_type: String,
    },

    /// A field is not recognized in its section
    #[error("{path}: unknown field")]
    UnknownField {
        /// Field path
        path: String,
    },

    /// A value has the wrong shape or is out of range
    #[error("{path}: {reason}")]
    InvalidValue {
        /// Field path
        path: String,
        /// What is wrong with the value
        reason: String,
    },

    /// Two layers of one network share a scope
    #[error("{path}: duplicate scope `{scope}`")]
    DuplicateScope {
        /// Field path
        path: String,
        /// Scope used more than once
        scope: String,
    },

    /// Fields are individually valid but contradict each other
    #[error("{path}: {reason}")]
    InconsistentFields {
        /// Field path
        path: String,
        /// Description of the contradiction
        reason: String,
    },

    /// Document is not valid JSON
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Dotted path of the offending field, if the error is field-level.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::UnknownScheduleKind { path, .. }
            | Self::UnsupportedMemoryType { path, .. }
            | Self::InvalidCapacity { path, .. }
            | Self::InvalidInterval { path, .. }
            | Self::InsufficientDevices { path, .. }
            | Self::MissingRequiredField { path }
            | Self::IncompatibleFieldForAgentType { path, .. }
            | Self::UnsupportedAgentType { path, .. }
            | Self::UnknownField { path }
            | Self::InvalidValue { path, .. }
            | Self::DuplicateScope { path, .. }
            | Self::InconsistentFields { path, .. } => Some(path),
            Self::Json(_) | Self::Io(_) => None,
        }
    }

    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Error reported by the external agent runtime.
///
/// Never produced by resolution itself; the update loop passes these
/// through unchanged.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Device allocation or placement failed
    #[error("Device error: {0}")]
    Device(String),

    /// The runtime failed while observing, updating or syncing
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for resolution
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Joins a parent path and a key into a dotted field path.
#[must_use]
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_exposed() {
        let err = ConfigError::InvalidInterval {
            path: "update_spec.sync_interval".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(err.path(), Some("update_spec.sync_interval"));
        assert!(err.to_string().contains("positive integer"));
    }

    #[test]
    fn test_json_error_has_no_path() {
        let err: ConfigError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.path().is_none());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "type"), "type");
        assert_eq!(join_path("memory_spec", "capacity"), "memory_spec.capacity");
    }
}
