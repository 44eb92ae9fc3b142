//! Messages exchanged between agents and the percept bundle each agent sees.
//!
//! Payloads are structured key/value data. The optional `blob` on signals and
//! projections is an opaque byte buffer that the kernel moves around but never
//! reads, parses or rewrites.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::env_state::EnvView;
use crate::ids::{AgentId, MessageId};

/// Structured payload carried by signals, requests and projections.
pub type Payload = serde_json::Map<String, Value>;

/// Unsolicited broadcast from one agent to every other agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: MessageId,
    pub sender: AgentId,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Bytes>,
}

impl Signal {
    /// Stamp a draft with its sender and a fresh id.
    pub fn from_draft(sender: AgentId, draft: SignalDraft) -> Self {
        Self {
            id: MessageId::generate(),
            sender,
            payload: draft.payload,
            blob: draft.blob,
        }
    }
}

/// A signal as produced by `Agent::act`, before the kernel stamps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalDraft {
    pub payload: Payload,
    pub blob: Option<Bytes>,
}

impl SignalDraft {
    pub fn new(payload: Payload) -> Self {
        Self { payload, blob: None }
    }

    pub fn with_blob(mut self, blob: impl Into<Bytes>) -> Self {
        self.blob = Some(blob.into());
        self
    }
}

/// Directed query from a requester to a publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: MessageId,
    /// The requester.
    pub sender: AgentId,
    /// The publisher being asked.
    pub receiver: AgentId,
    /// Opaque shape parameters built by the requester's lens.
    pub shape: Payload,
}

impl Request {
    pub fn new(sender: AgentId, receiver: AgentId, shape: Payload) -> Self {
        Self {
            id: MessageId::generate(),
            sender,
            receiver,
            shape,
        }
    }
}

/// A request emitted from `Agent::act`, answered in the next tick.
///
/// When `shape` is `None` the requester's lens builds it at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDraft {
    pub receiver: AgentId,
    pub shape: Option<Payload>,
}

impl RequestDraft {
    pub fn to(receiver: impl Into<AgentId>) -> Self {
        Self {
            receiver: receiver.into(),
            shape: None,
        }
    }

    pub fn with_shape(mut self, shape: Payload) -> Self {
        self.shape = Some(shape);
        self
    }
}

/// Response to a [`Request`], produced by the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub id: MessageId,
    /// The publisher.
    pub sender: AgentId,
    /// The requester.
    pub receiver: AgentId,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Bytes>,
}

impl Projection {
    /// Build a projection addressed back to whoever sent `request`.
    pub fn answering(request: &Request, payload: Payload) -> Self {
        Self {
            id: MessageId::generate(),
            sender: request.receiver.clone(),
            receiver: request.sender.clone(),
            payload,
            blob: None,
        }
    }

    pub fn with_blob(mut self, blob: impl Into<Bytes>) -> Self {
        self.blob = Some(blob.into());
        self
    }
}

/// Everything one agent perceives in one tick.
///
/// Built fresh every tick by the kernel and delivered behind an `Arc`; it is
/// never mutated after delivery.
#[derive(Debug, Clone)]
pub struct Percept {
    pub(crate) agent_id: AgentId,
    pub(crate) tick: u64,
    pub(crate) projections: Vec<Projection>,
    pub(crate) signals: Vec<Signal>,
    pub(crate) data_feeds: Payload,
    pub(crate) env: EnvView,
    pub(crate) extras: Payload,
}

impl Percept {
    /// An empty percept, useful for driving an agent outside a runtime.
    pub fn empty(agent_id: AgentId, tick: u64) -> Self {
        Self {
            agent_id,
            tick,
            projections: Vec::new(),
            signals: Vec::new(),
            data_feeds: Payload::new(),
            env: EnvView::default(),
            extras: Payload::new(),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn data_feeds(&self) -> &Payload {
        &self.data_feeds
    }

    pub fn env(&self) -> &EnvView {
        &self.env
    }

    pub fn extras(&self) -> &Payload {
        &self.extras
    }

    /// Flatten into a generic JSON context, the default input to reasoning.
    ///
    /// Blobs are not included.
    pub fn to_context(&self) -> Value {
        serde_json::json!({
            "tick": self.tick,
            "agent_id": self.agent_id.as_str(),
            "projections": self
                .projections
                .iter()
                .map(|p| Value::Object(p.payload.clone()))
                .collect::<Vec<_>>(),
            "data_feeds": Value::Object(self.data_feeds.clone()),
            "signals": self
                .signals
                .iter()
                .map(|s| Value::Object(s.payload.clone()))
                .collect::<Vec<_>>(),
            "environment": self.env.to_value(),
            "extras": Value::Object(self.extras.clone()),
        })
    }
}

/// Output of `Agent::reason`. The kernel only routes it back into `act`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningOutput {
    /// The part of the reasoning meant to become outward behavior.
    pub outward: Payload,
    /// Everything else; opaque to the kernel.
    pub details: Payload,
}

impl ReasoningOutput {
    pub fn new(outward: Payload) -> Self {
        Self {
            outward,
            details: Payload::new(),
        }
    }
}

/// Marks an action as irreversible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolonomyMarker {
    pub kind: Option<String>,
    pub description: Option<String>,
}

/// Outward effects of one agent's action phase.
///
/// All of it is buffered and applied at commit time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Behavior {
    pub signals: Vec<SignalDraft>,
    pub requests: Vec<RequestDraft>,
    pub env_updates: Payload,
    pub holonomy: Option<HolonomyMarker>,
}

impl Behavior {
    /// Behavior with no effects.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
            && self.requests.is_empty()
            && self.env_updates.is_empty()
            && self.holonomy.is_none()
    }

    pub fn signal(mut self, draft: SignalDraft) -> Self {
        self.signals.push(draft);
        self
    }

    pub fn request(mut self, draft: RequestDraft) -> Self {
        self.requests.push(draft);
        self
    }

    pub fn set_env(mut self, key: impl Into<String>, value: Value) -> Self {
        self.env_updates.insert(key.into(), value);
        self
    }

    pub fn irreversible(mut self, kind: impl Into<String>, description: impl Into<String>) -> Self {
        self.holonomy = Some(HolonomyMarker {
            kind: Some(kind.into()),
            description: Some(description.into()),
        });
        self
    }
}

/// Build a [`Payload`] from a `json!` object literal. Non-objects yield an empty payload.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
