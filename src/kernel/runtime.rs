//! The in-process tick scheduler.
//!
//! One call to [`Runtime::tick`] runs every registered agent through
//! Perception, Reasoning and Action, then commits their behaviors. Within a
//! phase agents run concurrently; no agent enters phase N+1 before every
//! agent has left phase N.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::buffers::DoubleBuffer;
use super::call_bounded;
use super::phase::{Phase, TickPhase, TickTrace};
use super::registry::{AgentSlot, AgentTable};
use super::report::{AgentFault, TickReport};
use super::router::PerceptBuilder;
use crate::agent::Agent;
use crate::config::{KernelConfig, SchedulerConfig};
use crate::data_feeds::{DataFeed, DataFeedRegistry};
use crate::env_state::EnvironmentState;
use crate::error::{AgentError, CallStage, KernelError};
use crate::graph::{GraphConfig, SubscriptionGraph};
use crate::holonomy::{HolonomyEvent, HolonomyLog};
use crate::ids::{AgentId, WorldId};
use crate::lens::{DefaultLens, Lens, RequestContext};
use crate::messages::{Behavior, Payload, Percept, ReasoningOutput, Request, Signal};
use crate::profile::AgentProfile;

/// Role given to agents registered without a profile.
const DEFAULT_ROLE: &str = "agent";

pub struct Runtime {
    world_id: WorldId,
    scheduler: SchedulerConfig,
    graph_config: GraphConfig,
    graph: SubscriptionGraph,
    agents: AgentTable,
    env: EnvironmentState,
    feeds: DataFeedRegistry,
    signals: DoubleBuffer<Signal>,
    requests: DoubleBuffer<Request>,
    holonomy: HolonomyLog,
    percepts: HashMap<AgentId, Arc<Percept>>,
    last_trace: Option<TickTrace>,
    halted: Option<String>,
}

impl Runtime {
    pub fn new(world_id: impl Into<WorldId>) -> Self {
        Self {
            world_id: world_id.into(),
            scheduler: SchedulerConfig::default(),
            graph_config: GraphConfig::default(),
            graph: SubscriptionGraph::new(),
            agents: AgentTable::default(),
            env: EnvironmentState::new(),
            feeds: DataFeedRegistry::new(),
            signals: DoubleBuffer::new(),
            requests: DoubleBuffer::new(),
            holonomy: HolonomyLog::new(),
            percepts: HashMap::new(),
            last_trace: None,
            halted: None,
        }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(config.world_id.clone())
            .with_scheduler_config(config.scheduler.clone())
            .with_graph_config(config.graph.clone())
    }

    pub fn with_scheduler_config(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Static edges, merged with every profile's subscriptions.
    pub fn with_graph_config(mut self, graph: GraphConfig) -> Self {
        self.graph_config = graph;
        self.rebuild_graph();
        self
    }

    pub fn with_env(mut self, env: EnvironmentState) -> Self {
        self.env = env;
        self
    }

    /// Register an agent.
    ///
    /// Without a profile the agent gets role `"agent"` and no subscriptions;
    /// without a lens it gets a [`DefaultLens`]. Registration order is the
    /// commit order.
    pub fn register_agent(
        &mut self,
        agent: Box<dyn Agent>,
        profile: Option<AgentProfile>,
        lens: Option<Arc<dyn Lens>>,
    ) -> Result<(), KernelError> {
        let id = agent.agent_id().clone();
        let profile = profile.unwrap_or_else(|| AgentProfile::new(id.clone(), DEFAULT_ROLE));
        if profile.agent_id != id {
            return Err(KernelError::Config(format!(
                "profile for {} registered with agent {}",
                profile.agent_id, id
            )));
        }
        let lens = lens.unwrap_or_else(|| Arc::new(DefaultLens::new(format!("{}-default", id))));

        log::info!(
            "registering agent {} (role={}, lens={}, subscriptions={})",
            id,
            profile.role,
            lens.name(),
            profile.subscriptions.len()
        );
        log::debug!("lens {} config: {:?}", lens.name(), lens.config());
        self.agents
            .insert(AgentSlot {
                id,
                agent,
                profile,
                lens,
            })
            .map_err(|slot| KernelError::DuplicateAgent(slot.id))?;
        self.rebuild_graph();
        Ok(())
    }

    /// Replace an agent's profile; takes effect from the next tick.
    pub fn update_profile(&mut self, profile: AgentProfile) -> Result<(), KernelError> {
        let slot = self
            .agents
            .get_mut(&profile.agent_id)
            .ok_or_else(|| KernelError::UnknownAgent(profile.agent_id.clone()))?;
        slot.profile = profile;
        self.rebuild_graph();
        Ok(())
    }

    pub fn set_lens(&mut self, agent_id: &AgentId, lens: Arc<dyn Lens>) -> Result<(), KernelError> {
        let slot = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| KernelError::UnknownAgent(agent_id.clone()))?;
        log::debug!("agent {} now uses lens {}", agent_id, lens.name());
        slot.lens = lens;
        Ok(())
    }

    pub fn register_feed(&mut self, feed: Box<dyn DataFeed>) -> Result<(), KernelError> {
        self.feeds.register(feed)?;
        Ok(())
    }

    /// Fails when an edge names an agent that is not registered.
    ///
    /// Ticks tolerate dangling edges (they become routing faults); drivers
    /// that want a strict topology call this after registration.
    pub fn validate_graph(&self) -> Result<(), KernelError> {
        let dangling = self.graph.dangling_edges(|id| self.agents.contains(id));
        if dangling.is_empty() {
            return Ok(());
        }
        let edges: Vec<String> = dangling
            .iter()
            .map(|e| format!("{} -> {}", e.subscriber, e.publisher))
            .collect();
        Err(KernelError::Config(format!(
            "edges reference unregistered agents: {}",
            edges.join(", ")
        )))
    }

    fn rebuild_graph(&mut self) {
        self.graph = SubscriptionGraph::build(&self.graph_config, self.agents.profiles());
    }

    pub fn world_id(&self) -> &WorldId {
        &self.world_id
    }

    /// Registered agents in registration order.
    pub fn agents(&self) -> impl Iterator<Item = (&AgentId, &dyn Agent)> {
        self.agents.iter().map(|slot| (&slot.id, slot.agent.as_ref()))
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<&dyn Agent> {
        self.agents.get(agent_id).map(|slot| slot.agent.as_ref())
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn profile(&self, agent_id: &AgentId) -> Option<&AgentProfile> {
        self.agents.get(agent_id).map(|slot| &slot.profile)
    }

    /// Read-only view of an agent's state, for observers.
    pub fn visible_state(&self, agent_id: &AgentId) -> Option<Payload> {
        self.agents.get(agent_id).map(|slot| slot.agent.visible_state())
    }

    pub fn graph(&self) -> &SubscriptionGraph {
        &self.graph
    }

    pub fn env(&self) -> &EnvironmentState {
        &self.env
    }

    pub fn holonomy_events(&self) -> &HolonomyLog {
        &self.holonomy
    }

    pub fn holonomy_rate(&self, window: Option<u64>) -> f64 {
        self.holonomy.rate(window)
    }

    /// The percept delivered to an agent in the most recent tick.
    pub fn last_percept(&self, agent_id: &AgentId) -> Option<Arc<Percept>> {
        self.percepts.get(agent_id).cloned()
    }

    pub fn last_trace(&self) -> Option<&TickTrace> {
        self.last_trace.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Run one full tick.
    ///
    /// Per-agent failures are isolated and listed in the report. A fatal
    /// collaborator error aborts the tick before commit, so nothing the tick
    /// produced becomes visible, and every later call returns
    /// [`KernelError::Halted`].
    pub async fn tick(&mut self, tick: u64) -> Result<TickReport, KernelError> {
        if let Some(reason) = &self.halted {
            return Err(KernelError::Halted(reason.clone()));
        }

        let mut trace = TickTrace::new(tick);
        let mut report = TickReport::new(tick);
        let outcome = self.run_phases(tick, &mut trace, &mut report).await;
        self.last_trace = Some(trace);

        match outcome {
            Ok(()) => {
                log::info!(
                    "tick {} committed: {} signals, {} deferred requests, {} env writes, {} faults",
                    tick,
                    report.signals_committed,
                    report.requests_deferred,
                    report.env_keys_written.len(),
                    report.faults.len()
                );
                Ok(report)
            }
            Err(err) => {
                if let KernelError::Fatal { .. } = &err {
                    log::error!("tick {} aborted, halting scheduler: {}", tick, err);
                    self.halted = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    async fn run_phases(
        &mut self,
        tick: u64,
        trace: &mut TickTrace,
        report: &mut TickReport,
    ) -> Result<(), KernelError> {
        {
            let _phase = Phase::begin(trace, TickPhase::TickStart)?;
            let expired_signals = self.signals.rotate();
            let expired_requests = self.requests.rotate();
            if expired_signals + expired_requests > 0 {
                log::trace!(
                    "tick {}: expired {} signals and {} requests",
                    tick,
                    expired_signals,
                    expired_requests
                );
            }
            self.percepts.clear();
        }

        let perceived = {
            let _phase = Phase::begin(trace, TickPhase::Perception)?;
            self.perceive_all(tick, report).await?
        };

        let outputs = {
            let _phase = Phase::begin(trace, TickPhase::Reasoning)?;
            self.reason_all(perceived, report).await?
        };

        let behaviors = {
            let _phase = Phase::begin(trace, TickPhase::Action)?;
            self.act_all(outputs, report).await?
        };

        {
            let _phase = Phase::begin(trace, TickPhase::Commit)?;
            self.commit(tick, behaviors, report);
        }

        Phase::begin(trace, TickPhase::TickEnd)?;
        Ok(())
    }

    /// Build every percept against the same routing state, then deliver them.
    /// Returns, per agent in registration order, whether delivery succeeded.
    async fn perceive_all(
        &mut self,
        tick: u64,
        report: &mut TickReport,
    ) -> Result<Vec<bool>, KernelError> {
        let timeout = self.scheduler.call_timeout();
        let builder = PerceptBuilder {
            graph: &self.graph,
            agents: &self.agents,
            signals: self.signals.front(),
            deferred: self.requests.front(),
            feeds: &self.feeds,
            env: self.env.view(),
            timeout,
        };
        let mut percepts = Vec::with_capacity(self.agents.len());
        for slot in self.agents.iter() {
            percepts.push(Arc::new(builder.build(slot, tick, report).await?));
        }

        let outcomes = join_all(self.agents.iter_mut().zip(&percepts).map(|(slot, percept)| {
            let percept = Arc::clone(percept);
            async move {
                call_bounded(CallStage::Perceive, timeout, slot.agent.perceive(percept)).await
            }
        }))
        .await;

        let mut perceived = Vec::with_capacity(outcomes.len());
        for (slot, outcome) in self.agents.iter().zip(outcomes) {
            perceived.push(settle(&slot.id, CallStage::Perceive, outcome, report)?.is_some());
        }
        report.percepts_delivered = perceived.iter().filter(|ok| **ok).count();
        self.percepts = self
            .agents
            .iter()
            .map(|slot| slot.id.clone())
            .zip(percepts)
            .collect();
        Ok(perceived)
    }

    async fn reason_all(
        &mut self,
        perceived: Vec<bool>,
        report: &mut TickReport,
    ) -> Result<Vec<Option<ReasoningOutput>>, KernelError> {
        let timeout = self.scheduler.call_timeout();
        let outcomes = join_all(self.agents.iter_mut().zip(perceived).map(|(slot, ok)| async move {
            if !ok {
                return None;
            }
            Some(call_bounded(CallStage::Reason, timeout, slot.agent.reason()).await)
        }))
        .await;

        let mut outputs = Vec::with_capacity(outcomes.len());
        for (slot, outcome) in self.agents.iter().zip(outcomes) {
            outputs.push(match outcome {
                Some(result) => settle(&slot.id, CallStage::Reason, result, report)?,
                None => None,
            });
        }
        Ok(outputs)
    }

    async fn act_all(
        &mut self,
        outputs: Vec<Option<ReasoningOutput>>,
        report: &mut TickReport,
    ) -> Result<Vec<Option<Behavior>>, KernelError> {
        let timeout = self.scheduler.call_timeout();
        let outcomes = join_all(self.agents.iter_mut().zip(outputs).map(|(slot, output)| {
            async move {
                let output = output?;
                Some(call_bounded(CallStage::Act, timeout, slot.agent.act(output)).await)
            }
        }))
        .await;

        let mut behaviors = Vec::with_capacity(outcomes.len());
        for (slot, outcome) in self.agents.iter().zip(outcomes) {
            behaviors.push(match outcome {
                Some(result) => settle(&slot.id, CallStage::Act, result, report)?,
                None => None,
            });
        }
        Ok(behaviors)
    }

    /// Apply behaviors in registration order. Everything written here is
    /// read by the next tick's Perception.
    fn commit(&mut self, tick: u64, behaviors: Vec<Option<Behavior>>, report: &mut TickReport) {
        let mut writers: HashMap<String, AgentId> = HashMap::new();

        for (slot, behavior) in self.agents.iter().zip(behaviors) {
            let Some(behavior) = behavior else {
                continue;
            };

            for key in self.env.apply(&behavior.env_updates) {
                if let Some(previous) = writers.insert(key.clone(), slot.id.clone()) {
                    if previous != slot.id {
                        log::debug!(
                            "tick {}: env key {:?} written by {} then {}; keeping {}",
                            tick,
                            key,
                            previous,
                            slot.id,
                            slot.id
                        );
                    }
                }
                report.env_keys_written.push(key);
            }

            for draft in behavior.signals {
                self.signals.push(Signal::from_draft(slot.id.clone(), draft));
                report.signals_committed += 1;
            }

            for draft in behavior.requests {
                let shape = match draft.shape {
                    Some(shape) => shape,
                    None => slot.lens.build_request_shape(&RequestContext {
                        requester: &slot.id,
                        publisher: &draft.receiver,
                        tick: tick + 1,
                    }),
                };
                self.requests
                    .push(Request::new(slot.id.clone(), draft.receiver, shape));
                report.requests_deferred += 1;
            }

            if let Some(marker) = behavior.holonomy {
                self.holonomy.append(HolonomyEvent::new(
                    slot.id.clone(),
                    tick,
                    marker.kind,
                    marker.description,
                ));
                report.holonomy_events += 1;
            }
        }

        self.holonomy.observe_tick(tick);
    }
}

/// Fold one collaborator result into the report. Fatal errors escape.
fn settle<T>(
    agent_id: &AgentId,
    stage: CallStage,
    result: Result<T, AgentError>,
    report: &mut TickReport,
) -> Result<Option<T>, KernelError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AgentError::Fatal(source)) => Err(KernelError::Fatal {
            agent_id: agent_id.clone(),
            stage,
            source,
        }),
        Err(err) => {
            report.record(AgentFault::collaborator(agent_id.clone(), stage, &err));
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::data_feeds::StaticDataFeed;
    use crate::graph::EdgeConfig;
    use crate::kernel::report::FaultKind;
    use crate::kernel::testing::{ProjectionMode, ScriptedAgent};
    use crate::lens::{FieldMatchConfig, FieldMatchLens};
    use crate::messages::{payload, RequestDraft, SignalDraft};

    fn id(s: &str) -> AgentId {
        AgentId::new(s)
    }

    fn shout(body: serde_json::Value) -> Behavior {
        Behavior::empty().signal(SignalDraft::new(payload(body)))
    }

    #[tokio::test]
    async fn test_single_subscription_delivers_one_projection() {
        let mut rt = Runtime::new("w");
        rt.register_agent(ScriptedAgent::new("a").boxed(), None, None).unwrap();
        rt.register_agent(
            ScriptedAgent::new("b").boxed(),
            Some(AgentProfile::new("b", "observer").subscribe("a")),
            None,
        )
        .unwrap();

        let report = rt.tick(0).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.percepts_delivered, 2);

        let b = rt.last_percept(&id("b")).unwrap();
        assert_eq!(b.projections().len(), 1);
        assert_eq!(b.projections()[0].sender, id("a"));
        assert_eq!(b.projections()[0].receiver, id("b"));
        assert!(rt.last_percept(&id("a")).unwrap().projections().is_empty());
    }

    #[tokio::test]
    async fn test_lens_filters_signals() {
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("a")
                .at(
                    0,
                    shout(json!({"type": "important"}))
                        .signal(SignalDraft::new(payload(json!({"type": "regular"})))),
                )
                .boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(
            ScriptedAgent::new("b").boxed(),
            None,
            Some(Arc::new(FieldMatchLens::equals("important-only", "type", json!("important")))),
        )
        .unwrap();
        rt.register_agent(ScriptedAgent::new("c").boxed(), None, None).unwrap();

        rt.tick(0).await.unwrap();
        rt.tick(1).await.unwrap();

        let b = rt.last_percept(&id("b")).unwrap();
        assert_eq!(b.signals().len(), 1);
        assert_eq!(b.signals()[0].payload["type"], json!("important"));

        assert_eq!(rt.last_percept(&id("c")).unwrap().signals().len(), 2);
        assert!(rt.last_percept(&id("a")).unwrap().signals().is_empty());
    }

    #[tokio::test]
    async fn test_signals_visible_for_exactly_one_tick() {
        let mut rt = Runtime::new("w");
        rt.register_agent(ScriptedAgent::new("a").at(0, shout(json!({"n": 1}))).boxed(), None, None)
            .unwrap();
        rt.register_agent(ScriptedAgent::new("b").boxed(), None, None).unwrap();

        let report = rt.tick(0).await.unwrap();
        assert_eq!(report.signals_committed, 1);
        assert!(rt.last_percept(&id("b")).unwrap().signals().is_empty());

        rt.tick(1).await.unwrap();
        let seen = rt.last_percept(&id("b")).unwrap();
        assert_eq!(seen.signals().len(), 1);
        assert_eq!(seen.signals()[0].sender, id("a"));

        rt.tick(2).await.unwrap();
        assert!(rt.last_percept(&id("b")).unwrap().signals().is_empty());
    }

    #[tokio::test]
    async fn test_no_self_delivery_with_self_subscription() {
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("a").at(0, shout(json!({"n": 1}))).boxed(),
            Some(AgentProfile::new("a", "narcissist").subscribe("a")),
            None,
        )
        .unwrap();

        rt.tick(0).await.unwrap();
        rt.tick(1).await.unwrap();
        let a = rt.last_percept(&id("a")).unwrap();
        assert!(a.signals().is_empty());
        assert_eq!(a.projections().len(), 1);
        assert_eq!(a.projections()[0].sender, id("a"));
    }

    #[tokio::test]
    async fn test_cycle_resolves_both_directions() {
        let mut rt = Runtime::new("w").with_graph_config(GraphConfig {
            edges: vec![EdgeConfig::new("a", "b"), EdgeConfig::new("b", "a")],
        });
        rt.register_agent(ScriptedAgent::new("a").boxed(), None, None).unwrap();
        rt.register_agent(ScriptedAgent::new("b").boxed(), None, None).unwrap();

        let report = rt.tick(0).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(rt.last_percept(&id("a")).unwrap().projections()[0].sender, id("b"));
        assert_eq!(rt.last_percept(&id("b")).unwrap().projections()[0].sender, id("a"));
    }

    #[tokio::test]
    async fn test_projections_ordered_by_publisher_then_deferred() {
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("reader")
                .at(0, Behavior::empty().request(RequestDraft::to("oracle")))
                .boxed(),
            Some(AgentProfile::new("reader", "r").subscribe("zeta").subscribe("alpha")),
            None,
        )
        .unwrap();
        for name in ["zeta", "alpha", "oracle"] {
            rt.register_agent(ScriptedAgent::new(name).boxed(), None, None).unwrap();
        }

        rt.tick(0).await.unwrap();
        rt.tick(1).await.unwrap();
        let reader = rt.last_percept(&id("reader")).unwrap();
        let senders: Vec<&str> = reader
            .projections()
            .iter()
            .map(|p| p.sender.as_str())
            .collect();
        assert_eq!(senders, vec!["alpha", "zeta", "oracle"]);
    }

    #[tokio::test]
    async fn test_deferred_request_uses_lens_shape_and_expires() {
        let lens = FieldMatchLens::new(
            "asker",
            FieldMatchConfig {
                field: "type".into(),
                fields: vec!["price".into()],
                ..Default::default()
            },
        );
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("a")
                .at(0, Behavior::empty().request(RequestDraft::to("c")))
                .at(
                    1,
                    Behavior::empty().request(
                        RequestDraft::to("c").with_shape(payload(json!({"explicit": true}))),
                    ),
                )
                .boxed(),
            None,
            Some(Arc::new(lens)),
        )
        .unwrap();
        rt.register_agent(ScriptedAgent::new("c").boxed(), None, None).unwrap();

        let report = rt.tick(0).await.unwrap();
        assert_eq!(report.requests_deferred, 1);
        assert!(rt.last_percept(&id("a")).unwrap().projections().is_empty());

        rt.tick(1).await.unwrap();
        let a = rt.last_percept(&id("a")).unwrap();
        assert_eq!(a.projections().len(), 1);
        assert_eq!(a.projections()[0].payload["shape"], json!({"fields": ["price"]}));

        rt.tick(2).await.unwrap();
        let a = rt.last_percept(&id("a")).unwrap();
        assert_eq!(a.projections().len(), 1);
        assert_eq!(a.projections()[0].payload["shape"], json!({"explicit": true}));

        rt.tick(3).await.unwrap();
        assert!(rt.last_percept(&id("a")).unwrap().projections().is_empty());
    }

    #[tokio::test]
    async fn test_failed_act_is_isolated() {
        let mut rt = Runtime::new("w");
        rt.register_agent(ScriptedAgent::new("x").fail_act_at(0).boxed(), None, None)
            .unwrap();
        rt.register_agent(
            ScriptedAgent::new("y").at(0, shout(json!({"from": "y"}))).boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(ScriptedAgent::new("z").boxed(), None, None).unwrap();

        let report = rt.tick(0).await.unwrap();
        let faults: Vec<_> = report.faults_for(&id("x")).collect();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, FaultKind::Collaborator(CallStage::Act));
        assert_eq!(report.signals_committed, 1);

        let report = rt.tick(1).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(rt.last_percept(&id("z")).unwrap().signals().len(), 1);
        assert_eq!(rt.last_percept(&id("x")).unwrap().signals().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reason_skips_act() {
        let mut rt = Runtime::new("w");
        let x = ScriptedAgent::new("x")
            .fail_reason_at(0)
            .at(0, shout(json!({"never": true})));
        let calls = x.calls();
        rt.register_agent(x.boxed(), None, None).unwrap();

        let report = rt.tick(0).await.unwrap();
        assert_eq!(*calls.lock(), vec!["perceive@0".to_string(), "reason@0".to_string()]);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].kind, FaultKind::Collaborator(CallStage::Reason));
        assert_eq!(report.signals_committed, 0);
    }

    #[tokio::test]
    async fn test_failed_perceive_skips_reason_and_act() {
        let mut rt = Runtime::new("w");
        let blind = ScriptedAgent::new("blind").fail_perceive_at(0).at(
            0,
            shout(json!({"from": "blind"})).set_env("blind", json!(true)),
        );
        let blind_calls = blind.calls();
        rt.register_agent(blind.boxed(), None, None).unwrap();
        let seeing = ScriptedAgent::new("seeing")
            .at(0, Behavior::empty().set_env("seeing", json!(true)));
        let seeing_calls = seeing.calls();
        rt.register_agent(seeing.boxed(), None, None).unwrap();

        let report = rt.tick(0).await.unwrap();
        let faults: Vec<_> = report.faults_for(&id("blind")).collect();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, FaultKind::Collaborator(CallStage::Perceive));
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.percepts_delivered, 1);

        assert_eq!(*blind_calls.lock(), vec!["perceive@0".to_string()]);
        assert_eq!(
            *seeing_calls.lock(),
            vec!["perceive@0".to_string(), "reason@0".to_string(), "act@0".to_string()]
        );
        assert_eq!(report.signals_committed, 0);
        assert!(rt.env().get("blind").is_none());
        assert_eq!(rt.env().get("seeing"), Some(&json!(true)));

        let report = rt.tick(1).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.percepts_delivered, 2);
        assert!(rt.last_percept(&id("seeing")).unwrap().signals().is_empty());
    }

    #[tokio::test]
    async fn test_slow_reason_times_out() {
        let mut rt = Runtime::new("w").with_scheduler_config(SchedulerConfig {
            agent_call_timeout_ms: Some(20),
        });
        rt.register_agent(
            ScriptedAgent::new("slow")
                .slow_reason(Duration::from_millis(500))
                .at(0, Behavior::empty().set_env("slow", json!(true)))
                .boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(
            ScriptedAgent::new("quick")
                .at(0, Behavior::empty().set_env("quick", json!(true)))
                .boxed(),
            None,
            None,
        )
        .unwrap();

        let report = rt.tick(0).await.unwrap();
        let faults: Vec<_> = report.faults_for(&id("slow")).collect();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, FaultKind::Collaborator(CallStage::Reason));
        assert!(faults[0].message.contains("timed out"));
        assert_eq!(rt.env().get("quick"), Some(&json!(true)));
        assert!(rt.env().get("slow").is_none());
    }

    #[tokio::test]
    async fn test_fatal_halts_without_commit() {
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("ok")
                .at(0, Behavior::empty().set_env("k", json!(1)))
                .boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(ScriptedAgent::new("doomed").fatal_act_at(0).boxed(), None, None)
            .unwrap();

        let err = rt.tick(0).await.unwrap_err();
        match err {
            KernelError::Fatal { agent_id, stage, .. } => {
                assert_eq!(agent_id, id("doomed"));
                assert_eq!(stage, CallStage::Act);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(rt.is_halted());
        assert!(rt.env().get("k").is_none());
        assert!(!rt.last_trace().unwrap().is_complete());
        assert!(matches!(rt.tick(1).await, Err(KernelError::Halted(_))));
    }

    #[tokio::test]
    async fn test_fatal_projection_halts() {
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("pub").projections(ProjectionMode::Fatal).boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(
            ScriptedAgent::new("sub").boxed(),
            Some(AgentProfile::new("sub", "s").subscribe("pub")),
            None,
        )
        .unwrap();

        assert!(matches!(
            rt.tick(0).await,
            Err(KernelError::Fatal {
                stage: CallStage::Projection,
                ..
            })
        ));
        assert!(rt.is_halted());
    }

    #[tokio::test]
    async fn test_publisher_failures_become_faults() {
        let mut rt = Runtime::new("w").with_graph_config(GraphConfig {
            edges: vec![EdgeConfig::new("sub", "ghost")],
        });
        rt.register_agent(
            ScriptedAgent::new("flaky").projections(ProjectionMode::Fail).boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(
            ScriptedAgent::new("liar").projections(ProjectionMode::Misaddressed).boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(ScriptedAgent::new("solid").boxed(), None, None).unwrap();
        rt.register_agent(
            ScriptedAgent::new("sub").boxed(),
            Some(
                AgentProfile::new("sub", "s")
                    .subscribe("flaky")
                    .subscribe("liar")
                    .subscribe("solid"),
            ),
            None,
        )
        .unwrap();
        assert!(rt.validate_graph().is_err());

        let report = rt.tick(0).await.unwrap();
        let sub = rt.last_percept(&id("sub")).unwrap();
        assert_eq!(sub.projections().len(), 1);
        assert_eq!(sub.projections()[0].sender, id("solid"));

        assert_eq!(report.faults_for(&id("sub")).next().unwrap().kind, FaultKind::Routing);
        assert_eq!(
            report.faults_for(&id("flaky")).next().unwrap().kind,
            FaultKind::Collaborator(CallStage::Projection)
        );
        assert_eq!(report.faults_for(&id("liar")).next().unwrap().kind, FaultKind::Routing);
    }

    #[tokio::test]
    async fn test_env_commit_is_deferred_and_last_writer_wins() {
        let mut rt = Runtime::new("w").with_env(EnvironmentState::new().with("k", json!(0)));
        rt.register_agent(
            ScriptedAgent::new("first")
                .at(0, Behavior::empty().set_env("k", json!(1)))
                .boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(
            ScriptedAgent::new("second")
                .at(0, Behavior::empty().set_env("k", json!(2)))
                .boxed(),
            None,
            None,
        )
        .unwrap();

        let report = rt.tick(0).await.unwrap();
        assert_eq!(report.env_keys_written, vec!["k".to_string(), "k".to_string()]);
        assert_eq!(rt.last_percept(&id("first")).unwrap().env().get("k"), Some(&json!(0)));
        assert_eq!(rt.env().get("k"), Some(&json!(2)));

        rt.tick(1).await.unwrap();
        assert_eq!(rt.last_percept(&id("first")).unwrap().env().get("k"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_holonomy_rate_over_ten_ticks() {
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("a")
                .at(2, Behavior::empty().irreversible("publish", "sent the memo"))
                .at(5, Behavior::empty().irreversible("delete", "dropped the draft"))
                .boxed(),
            None,
            None,
        )
        .unwrap();

        for t in 0..10 {
            rt.tick(t).await.unwrap();
        }
        let events = rt.holonomy_events().all();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 2);
        assert_eq!(events[1].kind.as_deref(), Some("delete"));
        assert!((rt.holonomy_rate(None) - 0.2).abs() < 1e-9);
        assert!((rt.holonomy_rate(Some(5)) - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_default_lens_passes_blobs_untouched() {
        const RAW: &[u8] = &[0, 159, 146, 150, 255];
        let mut rt = Runtime::new("w");
        rt.register_agent(
            ScriptedAgent::new("a")
                .projection_blob(RAW)
                .at(
                    0,
                    Behavior::empty().signal(
                        SignalDraft::new(payload(json!({"n": 1})))
                            .with_blob(Bytes::from_static(RAW)),
                    ),
                )
                .boxed(),
            None,
            None,
        )
        .unwrap();
        rt.register_agent(
            ScriptedAgent::new("b").boxed(),
            Some(AgentProfile::new("b", "r").subscribe("a")),
            None,
        )
        .unwrap();

        rt.tick(0).await.unwrap();
        rt.tick(1).await.unwrap();
        let b = rt.last_percept(&id("b")).unwrap();
        assert_eq!(b.projections()[0].blob.as_deref(), Some(RAW));
        assert_eq!(
            b.projections()[0].payload,
            payload(json!({"from": "a", "shape": {}}))
        );
        assert_eq!(b.signals()[0].blob.as_deref(), Some(RAW));
        assert_eq!(b.signals()[0].payload, payload(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_lens_transforms_projection_payload() {
        let lens = FieldMatchLens::new(
            "narrow",
            FieldMatchConfig {
                field: "type".into(),
                keep: vec!["from".into()],
                ..Default::default()
            },
        );
        let mut rt = Runtime::new("w");
        rt.register_agent(ScriptedAgent::new("a").boxed(), None, None).unwrap();
        rt.register_agent(
            ScriptedAgent::new("b").boxed(),
            Some(AgentProfile::new("b", "r").subscribe("a")),
            Some(Arc::new(lens)),
        )
        .unwrap();

        rt.tick(0).await.unwrap();
        let b = rt.last_percept(&id("b")).unwrap();
        assert_eq!(b.projections()[0].payload, payload(json!({"from": "a"})));
    }

    #[tokio::test]
    async fn test_percept_carries_feeds_and_extras() {
        let mut rt = Runtime::new("w");
        rt.register_feed(Box::new(StaticDataFeed::new(
            "market",
            payload(json!({"price": 10})),
        )))
        .unwrap();
        assert!(matches!(
            rt.register_feed(Box::new(StaticDataFeed::new("market", Payload::new()))),
            Err(KernelError::Settings(_))
        ));
        rt.register_agent(
            ScriptedAgent::new("a").boxed(),
            Some(AgentProfile::new("a", "trader").with_tool("search").with_tag("retail")),
            None,
        )
        .unwrap();

        rt.tick(0).await.unwrap();
        let a = rt.last_percept(&id("a")).unwrap();
        assert_eq!(a.tick(), 0);
        assert_eq!(a.data_feeds()["market"], json!({"price": 10}));
        assert_eq!(a.extras()["role"], json!("trader"));
        assert_eq!(a.extras()["tools"], json!(["search"]));
        assert_eq!(a.extras()["tags"], json!(["retail"]));
    }

    #[tokio::test]
    async fn test_update_profile_changes_routing() {
        let mut rt = Runtime::new("w");
        rt.register_agent(ScriptedAgent::new("a").boxed(), None, None).unwrap();
        rt.register_agent(ScriptedAgent::new("b").boxed(), None, None).unwrap();

        rt.tick(0).await.unwrap();
        assert!(rt.last_percept(&id("b")).unwrap().projections().is_empty());

        rt.update_profile(AgentProfile::new("b", "agent").subscribe("a")).unwrap();
        rt.tick(1).await.unwrap();
        assert_eq!(rt.last_percept(&id("b")).unwrap().projections().len(), 1);

        assert!(matches!(
            rt.update_profile(AgentProfile::new("ghost", "agent")),
            Err(KernelError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_trace_covers_every_phase() {
        let mut rt = Runtime::new("w");
        rt.register_agent(ScriptedAgent::new("a").boxed(), None, None).unwrap();
        rt.tick(7).await.unwrap();

        let trace = rt.last_trace().unwrap();
        assert_eq!(trace.tick(), 7);
        assert!(trace.is_complete());
        assert_eq!(
            trace.phases(),
            vec![
                TickPhase::TickStart,
                TickPhase::Perception,
                TickPhase::Reasoning,
                TickPhase::Action,
                TickPhase::Commit,
                TickPhase::TickEnd,
            ]
        );
    }

    #[test]
    fn test_registration_errors() {
        let mut rt = Runtime::new("w");
        rt.register_agent(ScriptedAgent::new("a").boxed(), None, None).unwrap();
        assert!(matches!(
            rt.register_agent(ScriptedAgent::new("a").boxed(), None, None),
            Err(KernelError::DuplicateAgent(_))
        ));
        assert!(matches!(
            rt.register_agent(
                ScriptedAgent::new("b").boxed(),
                Some(AgentProfile::new("c", "agent")),
                None
            ),
            Err(KernelError::Config(_))
        ));
        assert_eq!(rt.agent_count(), 1);
        assert_eq!(rt.profile(&id("a")).unwrap().role, "agent");
        assert_eq!(rt.visible_state(&id("a")).unwrap()["id"], json!("a"));
        assert!(rt.validate_graph().is_ok());
    }
}
