//! Append-only ledger of irreversible actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// One action an agent marked as irreversible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolonomyEvent {
    pub agent_id: AgentId,
    pub tick: u64,
    /// Type tag chosen by the agent.
    pub kind: Option<String>,
    pub description: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl HolonomyEvent {
    pub fn new(
        agent_id: AgentId,
        tick: u64,
        kind: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            agent_id,
            tick,
            kind,
            description,
            recorded_at: Utc::now(),
        }
    }
}

/// Event ledger plus the tick bookkeeping needed for rate queries.
#[derive(Debug, Clone, Default)]
pub struct HolonomyLog {
    events: Vec<HolonomyEvent>,
    ticks_elapsed: u64,
    latest_tick: Option<u64>,
}

impl HolonomyLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: HolonomyEvent) {
        log::debug!(
            "holonomy event: agent={} tick={} kind={:?}",
            event.agent_id,
            event.tick,
            event.kind
        );
        self.events.push(event);
    }

    /// Record that a tick completed, whether or not it produced events.
    pub fn observe_tick(&mut self, tick: u64) {
        self.ticks_elapsed += 1;
        self.latest_tick = Some(self.latest_tick.map_or(tick, |t| t.max(tick)));
    }

    pub fn all(&self) -> &[HolonomyEvent] {
        &self.events
    }

    pub fn for_agent<'a>(
        &'a self,
        agent_id: &'a AgentId,
    ) -> impl Iterator<Item = &'a HolonomyEvent> {
        self.events.iter().filter(move |e| &e.agent_id == agent_id)
    }

    pub fn ticks_elapsed(&self) -> u64 {
        self.ticks_elapsed
    }

    /// Events per tick.
    ///
    /// With a window of `w` ticks, counts events whose tick falls in the last
    /// `w` ticks up to and including the latest observed tick, divided by `w`.
    /// Without a window, divides all events by the number of ticks elapsed.
    /// The denominator is never below 1.
    pub fn rate(&self, window: Option<u64>) -> f64 {
        match window {
            Some(window) => {
                let Some(latest) = self.latest_tick else {
                    return 0.0;
                };
                let span = window.max(1);
                let start = latest.saturating_sub(span - 1);
                let count = self
                    .events
                    .iter()
                    .filter(|e| e.tick >= start && e.tick <= latest)
                    .count();
                count as f64 / span as f64
            }
            None => self.events.len() as f64 / self.ticks_elapsed.max(1) as f64,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
