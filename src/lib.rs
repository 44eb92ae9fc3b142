//! # Synaplex
//!
//! A tick-based kernel for multi-agent worlds.
//!
//! Each agent owns a private, versioned snapshot of its state and sees the
//! rest of the world only through what the kernel routes to it:
//!
//! - projections pulled from agents it subscribes to, shaped by its own
//!   [`Lens`](lens::Lens)
//! - signals other agents broadcast in the previous tick, filtered by that lens
//! - a read-only view of the shared environment and any data feeds
//!
//! The [`Runtime`] runs every tick as TickStart → Perception → Reasoning →
//! Action → Commit → TickEnd. Agents never call each other directly, and
//! nothing an agent does in tick T is visible to anyone before T+1.

pub mod agent;
pub mod config;
pub mod data_feeds;
pub mod env_state;
pub mod error;
pub mod graph;
pub mod holonomy;
pub mod ids;
pub mod kernel;
pub mod lens;
pub mod messages;
pub mod profile;
pub mod snapshot;

pub use agent::Agent;
pub use config::KernelConfig;
pub use env_state::{EnvView, EnvironmentState};
pub use error::{AgentError, CallStage, ConfigError, KernelError, ProfileError, SnapshotError};
pub use graph::{EdgeConfig, GraphConfig, SubscriptionGraph};
pub use holonomy::{HolonomyEvent, HolonomyLog};
pub use ids::{AgentId, MessageId, WorldId};
pub use kernel::{Runtime, TickPhase, TickReport};
pub use lens::{DefaultLens, FieldMatchLens, Lens};
pub use messages::{
    Behavior, Payload, Percept, Projection, ReasoningOutput, Request, RequestDraft, Signal,
    SignalDraft,
};
pub use profile::AgentProfile;
pub use snapshot::{load_or_genesis, FileSnapshotStore, Snapshot, SnapshotStore};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
