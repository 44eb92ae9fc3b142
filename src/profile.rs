//! Agent profiles ("DNA").
//!
//! A profile is the structural blueprint of an agent: its role, who it
//! subscribes to, the tools it may declare, numeric behavior parameters and
//! free-form tags. The kernel treats a profile as read-only for the duration
//! of a tick. Profiles may be replaced between ticks through
//! [`Runtime::update_profile`](crate::kernel::Runtime::update_profile).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::ids::AgentId;
use crate::messages::Payload;

/// Structural blueprint for a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub role: String,
    /// Publishers this agent pulls projections from.
    #[serde(default)]
    pub subscriptions: BTreeSet<AgentId>,
    /// Declared tool names, surfaced to the agent through its percept extras.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub behavior_params: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque configuration blob. Never read by the kernel.
    #[serde(default)]
    pub config: Payload,
}

impl AgentProfile {
    /// Create a profile with no subscriptions, tools or parameters.
    pub fn new(agent_id: impl Into<AgentId>, role: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            subscriptions: BTreeSet::new(),
            tools: Vec::new(),
            behavior_params: BTreeMap::new(),
            tags: Vec::new(),
            config: Payload::new(),
        }
    }

    /// Add a publisher subscription.
    pub fn subscribe(mut self, publisher: impl Into<AgentId>) -> Self {
        self.subscriptions.insert(publisher.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.behavior_params.insert(name.into(), value);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Look up a behavior parameter.
    ///
    /// Fails with the list of available parameter names when `name` is absent.
    pub fn param(&self, name: &str) -> Result<f64, ProfileError> {
        self.behavior_params
            .get(name)
            .copied()
            .ok_or_else(|| ProfileError::MissingParam {
                agent_id: self.agent_id.clone(),
                name: name.to_string(),
                available: self.behavior_params.keys().cloned().collect(),
            })
    }

    /// Look up a behavior parameter, falling back to `default`.
    pub fn param_or(&self, name: &str, default: f64) -> f64 {
        self.behavior_params.get(name).copied().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_dedups_subscriptions() {
        let profile = AgentProfile::new("b", "critic").subscribe("a").subscribe("a");
        assert_eq!(profile.subscriptions.len(), 1);
    }

    #[test]
    fn test_param_lookup() {
        let profile = AgentProfile::new("a", "scout").with_param("curiosity", 0.7);
        assert_eq!(profile.param("curiosity").unwrap(), 0.7);
        assert_eq!(profile.param_or("boldness", 0.1), 0.1);

        let err = profile.param("boldness").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boldness"));
        assert!(msg.contains("curiosity"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let profile: AgentProfile =
            serde_yaml::from_str("agent_id: b\nrole: critic\nsubscriptions: [a, c]\n").unwrap();
        assert_eq!(profile.subscriptions.len(), 2);
        assert!(profile.tools.is_empty());
        assert!(profile.config.is_empty());
    }
}
