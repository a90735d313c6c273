//! Field access over raw JSON sections
//!
//! A [`Section`] wraps one JSON object and remembers which keys were read,
//! so that anything left over can be reported as an unknown field once the
//! section has been fully resolved.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use sentient_rl_spec::error::join_path;
use sentient_rl_spec::schedule::{self, positive_interval};
use sentient_rl_spec::{ConfigError, Result, ScheduleSpec};

use crate::options::UnknownFieldPolicy;

/// Read cursor over one object of the document
#[derive(Debug)]
pub struct Section<'a> {
    path: String,
    map: &'a Map<String, Value>,
    consumed: BTreeSet<&'a str>,
}

impl<'a> Section<'a> {
    /// Wrap `value`, which must be an object, found at `path`.
    pub fn new(value: &'a Value, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        match value {
            Value::Object(map) => Ok(Self {
                path,
                map,
                consumed: BTreeSet::new(),
            }),
            _ => Err(ConfigError::invalid(
                if path.is_empty() { "<document>" } else { path.as_str() },
                "expected an object",
            )),
        }
    }

    /// Path of this section
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of `key` inside this section
    #[must_use]
    pub fn path_of(&self, key: &str) -> String {
        join_path(&self.path, key)
    }

    /// Whether `key` is present and not null, without consuming it
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.map.get(key).is_some_and(|v| !v.is_null())
    }

    /// Raw value of `key`; null counts as absent.
    pub fn get(&mut self, key: &str) -> Option<&'a Value> {
        let (k, v) = self.map.get_key_value(key)?;
        self.consumed.insert(k.as_str());
        if v.is_null() {
            None
        } else {
            Some(v)
        }
    }

    /// Raw value of a required `key`
    pub fn require(&mut self, key: &str) -> Result<&'a Value> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingRequiredField { path: self.path_of(key) })
    }

    /// Nested object at `key`
    pub fn section(&mut self, key: &str) -> Result<Option<Section<'a>>> {
        let path = self.path_of(key);
        self.get(key).map(|v| Section::new(v, path)).transpose()
    }

    /// Nested object at a required `key`
    pub fn require_section(&mut self, key: &str) -> Result<Section<'a>> {
        let value = self.require(key)?;
        Section::new(value, self.path_of(key))
    }

    /// String at `key`
    pub fn str(&mut self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(self.path_of(key), "expected a string")),
        }
    }

    /// String at a required `key`
    pub fn require_str(&mut self, key: &str) -> Result<&'a str> {
        self.str(key)?
            .ok_or_else(|| ConfigError::MissingRequiredField { path: self.path_of(key) })
    }

    /// Boolean at `key`
    pub fn bool(&mut self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(self.path_of(key), "expected a boolean")),
        }
    }

    /// Finite number at `key`
    pub fn f64(&mut self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => match v.as_f64() {
                Some(x) if x.is_finite() => Ok(Some(x)),
                _ => Err(ConfigError::invalid(self.path_of(key), "expected a finite number")),
            },
        }
    }

    /// Non-negative integer at `key`
    pub fn u64(&mut self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                ConfigError::invalid(self.path_of(key), "expected a non-negative integer")
            }),
        }
    }

    /// Positive integer at `key`; zero or negative fails with `InvalidInterval`.
    pub fn interval(&mut self, key: &str) -> Result<Option<u64>> {
        let path = self.path_of(key);
        self.get(key).map(|v| positive_interval(v, &path)).transpose()
    }

    /// Positive integer at a required `key`
    pub fn require_interval(&mut self, key: &str) -> Result<u64> {
        self.interval(key)?
            .ok_or_else(|| ConfigError::MissingRequiredField { path: self.path_of(key) })
    }

    /// Schedule at `key`
    pub fn schedule(&mut self, key: &str) -> Result<Option<ScheduleSpec>> {
        let path = self.path_of(key);
        self.get(key).map(|v| schedule::resolve(v, &path)).transpose()
    }

    /// Schedule at a required `key`
    pub fn require_schedule(&mut self, key: &str) -> Result<ScheduleSpec> {
        self.schedule(key)?
            .ok_or_else(|| ConfigError::MissingRequiredField { path: self.path_of(key) })
    }

    /// Every key not yet consumed, with its value, in document order
    pub fn take_rest(&mut self) -> Map<String, Value> {
        let rest: Map<String, Value> = self
            .map
            .iter()
            .filter(|(k, _)| !self.consumed.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.consumed.extend(self.map.keys().map(String::as_str));
        rest
    }

    /// Fails if a key that belongs to another agent type is present.
    pub fn forbid(&self, keys: &[&str], agent_type: &str) -> Result<()> {
        match keys.iter().find(|k| self.map.contains_key(**k)) {
            Some(key) => Err(ConfigError::IncompatibleFieldForAgentType {
                path: self.path_of(key),
                agent_type: agent_type.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Close the section, applying `policy` to keys nobody read.
    pub fn finish(self, policy: UnknownFieldPolicy) -> Result<()> {
        let mut unknown = self
            .map
            .keys()
            .filter(|k| !self.consumed.contains(k.as_str()));
        match policy {
            UnknownFieldPolicy::Reject => match unknown.next() {
                Some(key) => Err(ConfigError::UnknownField {
                    path: self.path_of(key),
                }),
                None => Ok(()),
            },
            UnknownFieldPolicy::Ignore => {
                for key in unknown {
                    tracing::debug!(path = %self.path_of(key), "ignoring unknown field");
                }
                Ok(())
            }
        }
    }
}
