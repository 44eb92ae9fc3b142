//! The tick kernel: scheduling, routing and commit.
//!
//! [`Runtime`] owns every agent and drives the three-phase loop. Agents only
//! communicate through what the kernel routes for them:
//!
//! - projections, pulled along subscription edges or deferred requests
//! - signals, broadcast and filtered by each receiver's lens
//! - the shared environment, written only at commit
//!
//! Effects produced in tick T are committed at the end of T and become
//! visible in T+1's Perception (see [`buffers`]).

pub mod buffers;
pub mod phase;
pub mod report;
pub mod runtime;

mod registry;
mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use buffers::DoubleBuffer;
pub use phase::{Phase, PhaseRecord, TickPhase, TickTrace};
pub use report::{AgentFault, FaultKind, TickReport};
pub use runtime::Runtime;

use std::future::Future;
use std::time::Duration;

use crate::error::{AgentError, CallStage};

/// Await a collaborator call, turning an overrun into [`AgentError::Timeout`].
pub(crate) async fn call_bounded<T, F>(
    stage: CallStage,
    timeout: Option<Duration>,
    call: F,
) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| {
                Err(AgentError::Timeout {
                    stage,
                    after_ms: limit.as_millis() as u64,
                })
            }),
        None => call.await,
    }
}
