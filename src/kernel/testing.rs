//! Scriptable agent for scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::ids::AgentId;
use crate::messages::{payload, Behavior, Payload, Percept, Projection, ReasoningOutput, Request};

/// How a scripted agent answers projection requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProjectionMode {
    /// `{"from": <id>, "shape": <request shape>}`
    Echo,
    Fail,
    Fatal,
    /// Answers with the wrong receiver.
    Misaddressed,
}

/// Collaborator calls as `"<stage>@<tick>"`, in call order.
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) struct ScriptedAgent {
    id: AgentId,
    behaviors: HashMap<u64, Behavior>,
    fail_perceive_at: HashSet<u64>,
    fail_reason_at: HashSet<u64>,
    fail_act_at: HashSet<u64>,
    fatal_act_at: HashSet<u64>,
    reason_delay: Option<Duration>,
    projection_mode: ProjectionMode,
    projection_blob: Option<Bytes>,
    current_tick: u64,
    calls: CallLog,
}

impl ScriptedAgent {
    pub fn new(id: &str) -> Self {
        Self {
            id: AgentId::new(id),
            behaviors: HashMap::new(),
            fail_perceive_at: HashSet::new(),
            fail_reason_at: HashSet::new(),
            fail_act_at: HashSet::new(),
            fatal_act_at: HashSet::new(),
            reason_delay: None,
            projection_mode: ProjectionMode::Echo,
            projection_blob: None,
            current_tick: 0,
            calls: CallLog::default(),
        }
    }

    /// Shared handle on this agent's call log; grab it before boxing.
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn log_call(&self, stage: &str, tick: u64) {
        self.calls.lock().push(format!("{}@{}", stage, tick));
    }

    pub fn boxed(self) -> Box<dyn Agent> {
        Box::new(self)
    }

    /// Behave this way when acting in `tick`.
    pub fn at(mut self, tick: u64, behavior: Behavior) -> Self {
        self.behaviors.insert(tick, behavior);
        self
    }

    pub fn fail_perceive_at(mut self, tick: u64) -> Self {
        self.fail_perceive_at.insert(tick);
        self
    }

    pub fn fail_reason_at(mut self, tick: u64) -> Self {
        self.fail_reason_at.insert(tick);
        self
    }

    pub fn fail_act_at(mut self, tick: u64) -> Self {
        self.fail_act_at.insert(tick);
        self
    }

    pub fn fatal_act_at(mut self, tick: u64) -> Self {
        self.fatal_act_at.insert(tick);
        self
    }

    pub fn slow_reason(mut self, delay: Duration) -> Self {
        self.reason_delay = Some(delay);
        self
    }

    pub fn projections(mut self, mode: ProjectionMode) -> Self {
        self.projection_mode = mode;
        self
    }

    pub fn projection_blob(mut self, blob: &'static [u8]) -> Self {
        self.projection_blob = Some(Bytes::from_static(blob));
        self
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_id(&self) -> &AgentId {
        &self.id
    }

    async fn perceive(&mut self, percept: Arc<Percept>) -> Result<(), AgentError> {
        self.current_tick = percept.tick();
        self.log_call("perceive", self.current_tick);
        if self.fail_perceive_at.contains(&self.current_tick) {
            return Err(AgentError::recoverable("percept rejected"));
        }
        Ok(())
    }

    async fn reason(&mut self) -> Result<ReasoningOutput, AgentError> {
        self.log_call("reason", self.current_tick);
        if let Some(delay) = self.reason_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reason_at.contains(&self.current_tick) {
            return Err(AgentError::recoverable("model unavailable"));
        }
        Ok(ReasoningOutput::new(payload(json!({"tick": self.current_tick}))))
    }

    async fn act(&mut self, output: ReasoningOutput) -> Result<Behavior, AgentError> {
        let tick = output
            .outward
            .get("tick")
            .and_then(|t| t.as_u64())
            .ok_or_else(|| AgentError::recoverable("reasoning output has no tick"))?;
        self.log_call("act", tick);
        if self.fatal_act_at.contains(&tick) {
            return Err(AgentError::fatal("snapshot store unwritable"));
        }
        if self.fail_act_at.contains(&tick) {
            return Err(AgentError::recoverable("tool call failed"));
        }
        Ok(self.behaviors.get(&tick).cloned().unwrap_or_default())
    }

    async fn create_projection(&self, request: &Request) -> Result<Projection, AgentError> {
        let body = payload(json!({
            "from": self.id.as_str(),
            "shape": request.shape.clone(),
        }));
        let projection = match self.projection_mode {
            ProjectionMode::Echo => Projection::answering(request, body),
            ProjectionMode::Fail => return Err(AgentError::recoverable("publisher busy")),
            ProjectionMode::Fatal => return Err(AgentError::fatal("publisher state lost")),
            ProjectionMode::Misaddressed => {
                let mut p = Projection::answering(request, body);
                p.receiver = AgentId::new("nobody");
                p
            }
        };
        Ok(match &self.projection_blob {
            Some(blob) => projection.with_blob(blob.clone()),
            None => projection,
        })
    }

    fn visible_state(&self) -> Payload {
        payload(json!({"id": self.id.as_str(), "tick": self.current_tick}))
    }
}
