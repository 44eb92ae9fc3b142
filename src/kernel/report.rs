//! What happened during one tick.
//!
//! Per-agent failures never abort a tick. They are logged and collected here
//! so the driver can inspect them after `tick` returns.

use std::fmt;

use crate::error::{AgentError, CallStage};
use crate::ids::AgentId;

/// Category of an isolated, per-agent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Unknown publisher, mis-addressed projection and the like.
    Routing,
    /// A collaborator call returned an error or timed out.
    Collaborator(CallStage),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Routing => f.write_str("routing"),
            Self::Collaborator(stage) => write!(f, "{}", stage),
        }
    }
}

/// One isolated failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFault {
    pub agent_id: AgentId,
    pub kind: FaultKind,
    pub message: String,
}

impl AgentFault {
    pub fn routing(agent_id: AgentId, message: impl Into<String>) -> Self {
        Self {
            agent_id,
            kind: FaultKind::Routing,
            message: message.into(),
        }
    }

    pub fn collaborator(agent_id: AgentId, stage: CallStage, err: &AgentError) -> Self {
        Self {
            agent_id,
            kind: FaultKind::Collaborator(stage),
            message: err.to_string(),
        }
    }
}

/// Summary of a completed tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub percepts_delivered: usize,
    pub signals_committed: usize,
    pub requests_deferred: usize,
    /// Environment keys written at commit, in write order (may repeat).
    pub env_keys_written: Vec<String>,
    pub holonomy_events: usize,
    pub faults: Vec<AgentFault>,
}

impl TickReport {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, fault: AgentFault) {
        log::warn!(
            "tick {}: {} fault for agent {}: {}",
            self.tick,
            fault.kind,
            fault.agent_id,
            fault.message
        );
        self.faults.push(fault);
    }

    pub fn faults_for<'a>(
        &'a self,
        agent_id: &AgentId,
    ) -> impl Iterator<Item = &'a AgentFault> + 'a {
        let agent_id = agent_id.clone();
        self.faults.iter().filter(move |f| f.agent_id == agent_id)
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}
