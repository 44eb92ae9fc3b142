//! Shared environment state.
//!
//! One string-keyed map per world. Agents read it through an [`EnvView`]
//! captured at the start of Perception; the scheduler writes it only during
//! commit. Two agents writing the same key in one tick is a benign race:
//! commit applies behaviors in registration order and the last write wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::messages::Payload;

/// Read-only, point-in-time view of the environment.
///
/// Cloning is cheap; the underlying map is shared until the next commit
/// writes a new version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvView(Arc<BTreeMap<String, Value>>);

impl EnvView {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// The mutable environment owned by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentState {
    data: Arc<BTreeMap<String, Value>>,
}

impl EnvironmentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an environment before the first tick.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        Arc::make_mut(&mut self.data).insert(key.into(), value);
    }

    /// Apply a batch of updates, returning the keys written.
    pub fn apply(&mut self, updates: &Payload) -> Vec<String> {
        if updates.is_empty() {
            return Vec::new();
        }
        let data = Arc::make_mut(&mut self.data);
        updates
            .iter()
            .map(|(key, value)| {
                data.insert(key.clone(), value.clone());
                key.clone()
            })
            .collect()
    }

    /// A view that keeps seeing today's values after later commits.
    pub fn view(&self) -> EnvView {
        EnvView(Arc::clone(&self.data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
