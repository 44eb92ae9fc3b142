//! Subscription graph: who pulls projections from whom.
//!
//! The graph is the union of explicit edge configuration and every registered
//! agent's declared subscriptions. It is a routing table, not a dependency
//! DAG: cycles and self-edges are allowed and never analysed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::profile::AgentProfile;

/// A single subscriber → publisher edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub subscriber: AgentId,
    pub publisher: AgentId,
}

impl EdgeConfig {
    pub fn new(subscriber: impl Into<AgentId>, publisher: impl Into<AgentId>) -> Self {
        Self {
            subscriber: subscriber.into(),
            publisher: publisher.into(),
        }
    }
}

/// Static edge configuration for a world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

/// Deduplicated adjacency in both directions.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionGraph {
    publishers: BTreeMap<AgentId, BTreeSet<AgentId>>,
    subscribers: BTreeMap<AgentId, BTreeSet<AgentId>>,
}

impl SubscriptionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of configured edges and the profiles' subscription lists.
    pub fn build<'a>(
        config: &GraphConfig,
        profiles: impl IntoIterator<Item = &'a AgentProfile>,
    ) -> Self {
        let mut graph = Self::new();
        for edge in &config.edges {
            graph.add_edge(edge.subscriber.clone(), edge.publisher.clone());
        }
        for profile in profiles {
            for publisher in &profile.subscriptions {
                graph.add_edge(profile.agent_id.clone(), publisher.clone());
            }
        }
        graph
    }

    /// Returns `false` when the edge was already present.
    pub fn add_edge(&mut self, subscriber: AgentId, publisher: AgentId) -> bool {
        let inserted = self
            .publishers
            .entry(subscriber.clone())
            .or_default()
            .insert(publisher.clone());
        self.subscribers.entry(publisher).or_default().insert(subscriber);
        inserted
    }

    /// Publishers `subscriber` pulls from, in id order.
    pub fn publishers_of(&self, subscriber: &AgentId) -> BTreeSet<AgentId> {
        self.publishers.get(subscriber).cloned().unwrap_or_default()
    }

    /// Agents subscribed to `publisher`, in id order.
    pub fn subscribers_of(&self, publisher: &AgentId) -> BTreeSet<AgentId> {
        self.subscribers.get(publisher).cloned().unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.publishers.values().map(BTreeSet::len).sum()
    }

    /// Edges with an endpoint for which `is_known` returns false.
    pub fn dangling_edges(&self, is_known: impl Fn(&AgentId) -> bool) -> Vec<EdgeConfig> {
        self.publishers
            .iter()
            .flat_map(|(subscriber, publishers)| {
                publishers
                    .iter()
                    .map(move |publisher| EdgeConfig::new(subscriber.clone(), publisher.clone()))
            })
            .filter(|edge| !is_known(&edge.subscriber) || !is_known(&edge.publisher))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
