//! Receiver-owned attention policies.
//!
//! A [`Lens`] belongs to the agent that *receives* information. It decides
//! which broadcast signals the agent attends to, what the agent asks its
//! publishers for, and how a raw projection is reshaped into the agent's own
//! terms. Lenses are pure: no side effects, no access to blobs. The kernel
//! hands them payloads only, so a projection's blob always passes through
//! untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::AgentId;
use crate::messages::Payload;

/// What a lens knows when it shapes a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub requester: &'a AgentId,
    pub publisher: &'a AgentId,
    pub tick: u64,
}

/// Receiver-side filter and transform policy.
pub trait Lens: Send + Sync {
    fn name(&self) -> &str;

    /// Opaque configuration, for logging and inspection.
    fn config(&self) -> Payload {
        Payload::new()
    }

    /// Whether the receiver attends to a signal with this payload.
    fn should_attend(&self, payload: &Payload) -> bool {
        let _ = payload;
        true
    }

    /// The shape parameters sent to a publisher.
    fn build_request_shape(&self, context: &RequestContext<'_>) -> Payload {
        let _ = context;
        Payload::new()
    }

    /// Reshape a projection payload into the receiver's interpretation.
    fn transform_projection(&self, payload: Payload) -> Payload {
        payload
    }
}

/// Attends to everything and changes nothing.
#[derive(Debug, Clone, Default)]
pub struct DefaultLens {
    pub name: String,
    pub config: Payload,
}

impl DefaultLens {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Payload::new(),
        }
    }

    pub fn with_config(mut self, config: Payload) -> Self {
        self.config = config;
        self
    }
}

impl Lens for DefaultLens {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> Payload {
        self.config.clone()
    }
}

/// Configuration for [`FieldMatchLens`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMatchConfig {
    /// Payload field inspected on every signal.
    pub field: String,
    /// Values of `field` that pass. Empty means any value passes as long as
    /// the field is present.
    #[serde(default)]
    pub accept: Vec<Value>,
    /// Field names asked of publishers, sent as `{"fields": [...]}`.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Keys kept from projections. Empty keeps everything.
    #[serde(default)]
    pub keep: Vec<String>,
}

/// Attends only to signals whose `field` holds one of the accepted values.
#[derive(Debug, Clone)]
pub struct FieldMatchLens {
    name: String,
    config: FieldMatchConfig,
}

impl FieldMatchLens {
    pub fn new(name: impl Into<String>, config: FieldMatchConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Shorthand for "attend when `field == value`".
    pub fn equals(name: impl Into<String>, field: impl Into<String>, value: Value) -> Self {
        Self::new(
            name,
            FieldMatchConfig {
                field: field.into(),
                accept: vec![value],
                ..FieldMatchConfig::default()
            },
        )
    }

    pub fn settings(&self) -> &FieldMatchConfig {
        &self.config
    }
}

impl Lens for FieldMatchLens {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> Payload {
        match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }

    fn should_attend(&self, payload: &Payload) -> bool {
        match payload.get(&self.config.field) {
            Some(value) => self.config.accept.is_empty() || self.config.accept.contains(value),
            None => false,
        }
    }

    fn build_request_shape(&self, _context: &RequestContext<'_>) -> Payload {
        let mut shape = Payload::new();
        if !self.config.fields.is_empty() {
            shape.insert(
                "fields".to_string(),
                Value::Array(self.config.fields.iter().cloned().map(Value::String).collect()),
            );
        }
        shape
    }

    fn transform_projection(&self, payload: Payload) -> Payload {
        if self.config.keep.is_empty() {
            return payload;
        }
        payload
            .into_iter()
            .filter(|(key, _)| self.config.keep.contains(key))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
