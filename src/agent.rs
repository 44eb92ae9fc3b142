//! The collaborator interface the kernel drives every tick.
//!
//! The kernel never looks inside reasoning. It calls, in strictly separated
//! phases:
//!
//! 1. `perceive` with the agent's freshly built [`Percept`]
//! 2. `reason`, producing an opaque [`ReasoningOutput`]
//! 3. `act`, turning that output into a buffered [`Behavior`]
//!
//! `create_projection` is called during other agents' Perception whenever
//! they subscribe to, or sent a request to, this agent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::ids::AgentId;
use crate::messages::{Behavior, Payload, Percept, Projection, ReasoningOutput, Request};

/// An agent as seen by the tick scheduler.
///
/// Implementations may block or await (for example on a model call); the
/// scheduler bounds each call with its configured timeout.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_id(&self) -> &AgentId;

    /// Accept this tick's percept.
    async fn perceive(&mut self, percept: Arc<Percept>) -> Result<(), AgentError>;

    /// Think about the last percept.
    async fn reason(&mut self) -> Result<ReasoningOutput, AgentError>;

    /// Produce outward behavior from the reasoning output.
    async fn act(&mut self, output: ReasoningOutput) -> Result<Behavior, AgentError>;

    /// Answer a request from a subscriber.
    async fn create_projection(&self, request: &Request) -> Result<Projection, AgentError>;

    /// Structured state other parties may inspect.
    ///
    /// Must never include private snapshot content.
    fn visible_state(&self) -> Payload {
        Payload::new()
    }
}
