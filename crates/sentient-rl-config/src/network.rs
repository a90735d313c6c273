//! Layer stacks: network, value function and preprocessing specs
//!
//! Only the descriptor shape is validated here. Layer-specific parameters
//! (kernel sizes, strides, ...) are kept opaque for the network builder.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use sentient_rl_spec::{ConfigError, Result};

use crate::document::Section;
use crate::options::UnknownFieldPolicy;

/// One layer descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    /// Layer type, e.g. `dense`
    #[serde(rename = "type")]
    pub layer_type: String,
    /// Output units
    pub units: Option<u64>,
    /// Activation function name
    pub activation: Option<String>,
    /// Namespace key used downstream
    pub scope: Option<String>,
    /// Remaining layer parameters
    pub params: Map<String, Value>,
}

/// Ordered layer stack with unique scopes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSpec {
    /// Layers in application order
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// Declared scopes, in layer order
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().filter_map(|l| l.scope.as_deref())
    }

    /// Layer registered under `scope`
    #[must_use]
    pub fn layer(&self, scope: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.scope.as_deref() == Some(scope))
    }
}

/// One preprocessor in `preprocessing_spec`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessorSpec {
    /// Preprocessor type, e.g. `grayscale`
    #[serde(rename = "type")]
    pub preprocessor_type: String,
    /// Namespace key used downstream
    pub scope: Option<String>,
    /// Remaining preprocessor parameters
    pub params: Map<String, Value>,
}

/// Resolve a network or value-function spec written at `path`.
pub fn resolve_network(value: &Value, path: &str) -> Result<NetworkSpec> {
    let items = items(value, path)?;
    if items.is_empty() {
        return Err(ConfigError::invalid(path, "network needs at least one layer"));
    }

    let mut scopes = ScopeRegistry::default();
    let mut layers = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let mut layer = Section::new(item, format!("{path}.{index}"))?;
        let layer_type = layer.require_str("type")?.to_string();

        let units_path = layer.path_of("units");
        let units = match layer.get("units") {
            None => None,
            Some(v) => match v.as_u64() {
                Some(u) if u > 0 => Some(u),
                _ => return Err(ConfigError::invalid(units_path, "units must be a positive integer")),
            },
        };
        let activation = layer.str("activation")?.map(str::to_string);
        let scope = layer.str("scope")?.map(str::to_string);
        if let Some(scope) = &scope {
            scopes.claim(scope, &layer)?;
        }

        layers.push(LayerSpec {
            layer_type,
            units,
            activation,
            scope,
            params: layer.take_rest(),
        });
        layer.finish(UnknownFieldPolicy::Reject)?;
    }

    tracing::debug!(path, layers = layers.len(), "resolved network");
    Ok(NetworkSpec { layers })
}

/// Resolve `preprocessing_spec`; absent means no preprocessing.
pub fn resolve_preprocessing(value: Option<&Value>, path: &str) -> Result<Vec<PreprocessorSpec>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    let mut scopes = ScopeRegistry::default();
    let mut preprocessors = Vec::new();
    for (index, item) in items(value, path)?.iter().enumerate() {
        let mut entry = Section::new(item, format!("{path}.{index}"))?;
        let preprocessor_type = entry.require_str("type")?.to_string();
        let scope = entry.str("scope")?.map(str::to_string);
        if let Some(scope) = &scope {
            scopes.claim(scope, &entry)?;
        }
        preprocessors.push(PreprocessorSpec {
            preprocessor_type,
            scope,
            params: entry.take_rest(),
        });
        entry.finish(UnknownFieldPolicy::Reject)?;
    }
    Ok(preprocessors)
}

fn items<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ConfigError::invalid(path, "expected a list of descriptors"))
}

#[derive(Default)]
struct ScopeRegistry {
    seen: IndexMap<String, String>,
}

impl ScopeRegistry {
    fn claim(&mut self, scope: &str, owner: &Section<'_>) -> Result<()> {
        let path = owner.path_of("scope");
        if self.seen.contains_key(scope) {
            return Err(ConfigError::DuplicateScope {
                path,
                scope: scope.to_string(),
            });
        }
        self.seen.insert(scope.to_string(), path);
        Ok(())
    }
}
