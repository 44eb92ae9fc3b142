//! Percept construction (the message router).
//!
//! For agent A at tick T the router:
//!
//! 1. asks the subscription graph for A's publishers
//! 2. sends each publisher a request shaped by A's lens and passes the
//!    answer through A's `transform_projection`
//! 3. resolves requests A deferred during T-1 the same way
//! 4. keeps the signals other agents committed in T-1 that A's lens attends to
//! 5. attaches data feeds, the environment view and profile extras
//!
//! A publisher that is unknown or fails is skipped and recorded; it never
//! stops the percept from being built. Only a fatal collaborator error
//! escapes.

use std::time::Duration;

use serde_json::Value;

use super::call_bounded;
use super::registry::{AgentSlot, AgentTable};
use super::report::{AgentFault, TickReport};
use crate::data_feeds::DataFeedRegistry;
use crate::env_state::EnvView;
use crate::error::{AgentError, CallStage, KernelError};
use crate::graph::SubscriptionGraph;
use crate::lens::RequestContext;
use crate::messages::{Payload, Percept, Projection, Request, Signal};

/// Read-only routing state for one Perception phase.
pub(crate) struct PerceptBuilder<'a> {
    pub graph: &'a SubscriptionGraph,
    pub agents: &'a AgentTable,
    /// Signals committed in the previous tick.
    pub signals: &'a [Signal],
    /// Requests deferred in the previous tick.
    pub deferred: &'a [Request],
    pub feeds: &'a DataFeedRegistry,
    pub env: EnvView,
    pub timeout: Option<Duration>,
}

impl PerceptBuilder<'_> {
    pub async fn build(
        &self,
        slot: &AgentSlot,
        tick: u64,
        report: &mut TickReport,
    ) -> Result<Percept, KernelError> {
        let mut projections = Vec::new();

        for publisher in self.graph.publishers_of(&slot.id) {
            let shape = slot.lens.build_request_shape(&RequestContext {
                requester: &slot.id,
                publisher: &publisher,
                tick,
            });
            let request = Request::new(slot.id.clone(), publisher, shape);
            if let Some(projection) = self.resolve(slot, &request, report).await? {
                projections.push(projection);
            }
        }

        for request in self.deferred.iter().filter(|r| r.sender == slot.id) {
            if let Some(projection) = self.resolve(slot, request, report).await? {
                projections.push(projection);
            }
        }

        let signals: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| s.sender != slot.id)
            .filter(|s| slot.lens.should_attend(&s.payload))
            .cloned()
            .collect();

        log::debug!(
            "percept for {} at tick {}: {} projections, {}/{} signals attended",
            slot.id,
            tick,
            projections.len(),
            signals.len(),
            self.signals.iter().filter(|s| s.sender != slot.id).count()
        );

        Ok(Percept {
            agent_id: slot.id.clone(),
            tick,
            projections,
            signals,
            data_feeds: self.feeds.collect(tick, Some(&slot.id)),
            env: self.env.clone(),
            extras: extras_for(slot),
        })
    }

    /// Ask the request's receiver for a projection on behalf of `requester`.
    async fn resolve(
        &self,
        requester: &AgentSlot,
        request: &Request,
        report: &mut TickReport,
    ) -> Result<Option<Projection>, KernelError> {
        let Some(publisher) = self.agents.get(&request.receiver) else {
            report.record(AgentFault::routing(
                requester.id.clone(),
                format!("publisher {} is not registered", request.receiver),
            ));
            return Ok(None);
        };

        let result = call_bounded(
            CallStage::Projection,
            self.timeout,
            publisher.agent.create_projection(request),
        )
        .await;

        match result {
            Ok(mut projection) => {
                if projection.sender != request.receiver || projection.receiver != request.sender {
                    report.record(AgentFault::routing(
                        publisher.id.clone(),
                        format!(
                            "projection addressed {} -> {} does not answer request {} -> {}",
                            projection.sender, projection.receiver, request.sender, request.receiver
                        ),
                    ));
                    return Ok(None);
                }
                let raw = std::mem::take(&mut projection.payload);
                projection.payload = requester.lens.transform_projection(raw);
                Ok(Some(projection))
            }
            Err(AgentError::Fatal(source)) => Err(KernelError::Fatal {
                agent_id: publisher.id.clone(),
                stage: CallStage::Projection,
                source,
            }),
            Err(err) => {
                report.record(AgentFault::collaborator(
                    publisher.id.clone(),
                    CallStage::Projection,
                    &err,
                ));
                Ok(None)
            }
        }
    }
}

/// Profile-derived extras: role, declared tools and tags.
fn extras_for(slot: &AgentSlot) -> Payload {
    let mut extras = Payload::new();
    extras.insert("role".to_string(), Value::String(slot.profile.role.clone()));
    extras.insert(
        "tools".to_string(),
        Value::Array(slot.profile.tools.iter().cloned().map(Value::String).collect()),
    );
    extras.insert(
        "tags".to_string(),
        Value::Array(slot.profile.tags.iter().cloned().map(Value::String).collect()),
    );
    extras
}
