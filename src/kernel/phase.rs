//! Tick phases and their ordering discipline.
//!
//! Every tick walks the same state machine:
//!
//! ```text
//! TickStart → Perception → Reasoning → Action → Commit → TickEnd
//! ```
//!
//! A [`Phase`] guard is held while the scheduler works inside a phase. It
//! refuses to open a phase out of order and, when dropped, records how long
//! the phase took in the tick's [`TickTrace`]. All agents finish a phase
//! before the guard for the next one can be opened.

use std::fmt;

use crate::error::KernelError;

/// One step of the per-tick state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TickPhase {
    /// Buffers are rotated; nothing is visible to agents yet.
    TickStart,
    /// Percepts are built and delivered.
    Perception,
    /// Every agent reasons over its percept.
    Reasoning,
    /// Every agent turns its reasoning into buffered behavior.
    Action,
    /// Buffered behavior becomes world state.
    Commit,
    TickEnd,
}

impl TickPhase {
    /// The phase that must follow this one.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::TickStart => Some(Self::Perception),
            Self::Perception => Some(Self::Reasoning),
            Self::Reasoning => Some(Self::Action),
            Self::Action => Some(Self::Commit),
            Self::Commit => Some(Self::TickEnd),
            Self::TickEnd => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TickStart => "tick_start",
            Self::Perception => "perception",
            Self::Reasoning => "reasoning",
            Self::Action => "action",
            Self::Commit => "commit",
            Self::TickEnd => "tick_end",
        }
    }
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A completed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    pub phase: TickPhase,
    pub started_at_ms: i64,
    pub elapsed_ms: i64,
}

/// The phases one tick has gone through, in order.
#[derive(Debug, Clone)]
pub struct TickTrace {
    tick: u64,
    current: Option<TickPhase>,
    records: Vec<PhaseRecord>,
}

impl TickTrace {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            current: None,
            records: Vec::with_capacity(6),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The phase most recently entered.
    pub fn current(&self) -> Option<TickPhase> {
        self.current
    }

    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }

    pub fn phases(&self) -> Vec<TickPhase> {
        self.records.iter().map(|r| r.phase).collect()
    }

    /// Whether the tick made it all the way to `TickEnd`.
    pub fn is_complete(&self) -> bool {
        self.records.last().map(|r| r.phase) == Some(TickPhase::TickEnd)
    }

    fn enter(&mut self, phase: TickPhase) -> Result<(), KernelError> {
        let allowed = match self.current {
            None => phase == TickPhase::TickStart,
            Some(current) => current.next() == Some(phase),
        };
        if !allowed {
            return Err(KernelError::PhaseOrder {
                current: self.current.map_or("none", TickPhase::name).to_string(),
                attempted: phase.name().to_string(),
            });
        }
        self.current = Some(phase);
        log::trace!("tick {}: enter {}", self.tick, phase);
        Ok(())
    }

    fn record_end(&mut self, phase: TickPhase, started_at_ms: i64, elapsed_ms: i64) {
        log::trace!("tick {}: {} done in {} ms", self.tick, phase, elapsed_ms);
        self.records.push(PhaseRecord {
            phase,
            started_at_ms,
            elapsed_ms,
        });
    }
}

/// Scoped guard for one phase of one tick.
pub struct Phase<'a> {
    trace: &'a mut TickTrace,
    phase: TickPhase,
    start_epoch: i64,
}

impl<'a> Phase<'a> {
    /// Enter `phase`, failing if it does not follow the trace's current phase.
    pub fn begin(trace: &'a mut TickTrace, phase: TickPhase) -> Result<Self, KernelError> {
        trace.enter(phase)?;
        Ok(Self {
            trace,
            phase,
            start_epoch: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn elapsed_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() - self.start_epoch
    }
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        self.trace.record_end(self.phase, self.start_epoch, elapsed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
