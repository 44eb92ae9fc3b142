//! synaplex demo driver.
//!
//! Runs a small two-agent world: a `scribe` that keeps a running note count
//! in its snapshot lineage and broadcasts a note every tick, and a `reader`
//! that subscribes to the scribe and attends only to notes.
//!
//! # Environment Variables
//!
//! - `SYNAPLEX_CONFIG`: path to a YAML kernel config (optional)
//! - `SYNAPLEX_WORLD_ID`, `SYNAPLEX_SNAPSHOT_ROOT`, `SYNAPLEX_AGENT_TIMEOUT_MS`: config overrides
//! - `SYNAPLEX_MAX_TICKS`: stop after this many ticks (default: 20, `0` runs until Ctrl-C)
//! - `SYNAPLEX_TICK_MS`: delay between ticks (default: 200)
//! - `RUST_LOG`: tracing filter (default: "info,synaplex=debug")
//!
//! # Usage
//!
//! ```bash
//! SYNAPLEX_SNAPSHOT_ROOT=/tmp/world cargo run --bin synaplex-driver
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use synaplex::messages::payload;
use synaplex::{
    load_or_genesis, Agent, AgentError, AgentId, AgentProfile, Behavior, FieldMatchLens,
    FileSnapshotStore, KernelConfig, Payload, Percept, Projection, ReasoningOutput, Request,
    Runtime, SignalDraft, Snapshot, SnapshotStore,
};

/// Writes one note per tick and persists the running count.
struct Scribe {
    id: AgentId,
    store: Arc<dyn SnapshotStore>,
    latest: Snapshot,
    percept: Option<Arc<Percept>>,
}

impl Scribe {
    fn open(store: Arc<dyn SnapshotStore>) -> anyhow::Result<Self> {
        let id = AgentId::new("scribe");
        let latest = load_or_genesis(store.as_ref(), &id)?;
        tracing::info!("scribe resumes at snapshot v{}", latest.version);
        Ok(Self {
            id,
            store,
            latest,
            percept: None,
        })
    }

    fn notes(&self) -> u64 {
        self.latest.content.parse().unwrap_or(0)
    }
}

#[async_trait]
impl Agent for Scribe {
    fn agent_id(&self) -> &AgentId {
        &self.id
    }

    async fn perceive(&mut self, percept: Arc<Percept>) -> Result<(), AgentError> {
        self.percept = Some(percept);
        Ok(())
    }

    async fn reason(&mut self) -> Result<ReasoningOutput, AgentError> {
        let tick = self.percept.as_ref().map_or(0, |p| p.tick());
        Ok(ReasoningOutput::new(payload(json!({
            "tick": tick,
            "notes": self.notes() + 1,
        }))))
    }

    async fn act(&mut self, output: ReasoningOutput) -> Result<Behavior, AgentError> {
        let notes = output.outward.get("notes").and_then(Value::as_u64).unwrap_or(0);
        let tick = output.outward.get("tick").and_then(Value::as_u64).unwrap_or(0);

        // Losing the lineage is unrecoverable for this agent.
        let next = self.latest.successor(notes.to_string());
        self.store.save(&next).map_err(AgentError::fatal)?;
        self.latest = next;

        let mut behavior = Behavior::empty()
            .signal(SignalDraft::new(payload(json!({"type": "note", "n": notes}))))
            .set_env("notes_written", json!(notes));
        if tick > 0 && tick % 5 == 0 {
            behavior =
                behavior.irreversible("publish", format!("published digest of {} notes", notes));
        }
        Ok(behavior)
    }

    async fn create_projection(&self, request: &Request) -> Result<Projection, AgentError> {
        Ok(Projection::answering(request, payload(json!({"notes": self.notes()}))))
    }

    fn visible_state(&self) -> Payload {
        payload(json!({"notes": self.notes(), "version": self.latest.version}))
    }
}

/// Counts the notes it hears about.
struct Reader {
    id: AgentId,
    heard: u64,
    percept: Option<Arc<Percept>>,
}

#[async_trait]
impl Agent for Reader {
    fn agent_id(&self) -> &AgentId {
        &self.id
    }

    async fn perceive(&mut self, percept: Arc<Percept>) -> Result<(), AgentError> {
        self.percept = Some(percept);
        Ok(())
    }

    async fn reason(&mut self) -> Result<ReasoningOutput, AgentError> {
        let Some(percept) = &self.percept else {
            return Err(AgentError::recoverable("reason called before perceive"));
        };
        self.heard += percept.signals().len() as u64;
        let reported = percept
            .projections()
            .iter()
            .filter_map(|p| p.payload.get("notes"))
            .cloned()
            .next()
            .unwrap_or(Value::Null);
        Ok(ReasoningOutput::new(payload(json!({
            "heard": self.heard,
            "reported": reported,
        }))))
    }

    async fn act(&mut self, output: ReasoningOutput) -> Result<Behavior, AgentError> {
        let mut behavior = Behavior::empty();
        for (key, value) in output.outward {
            behavior = behavior.set_env(format!("reader_{}", key), value);
        }
        Ok(behavior)
    }

    async fn create_projection(&self, request: &Request) -> Result<Projection, AgentError> {
        Ok(Projection::answering(request, payload(json!({"heard": self.heard}))))
    }

    fn visible_state(&self) -> Payload {
        payload(json!({"heard": self.heard}))
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

fn load_config() -> anyhow::Result<KernelConfig> {
    let config = match std::env::var("SYNAPLEX_CONFIG") {
        Ok(path) => KernelConfig::from_yaml_file(&path)
            .with_context(|| format!("loading kernel config from {}", path))?,
        Err(_) => KernelConfig::default(),
    };
    Ok(config.apply_env_overrides()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,synaplex=debug".into()),
        )
        .init();

    let config = load_config()?;
    let max_ticks = env_u64("SYNAPLEX_MAX_TICKS", 20)?;
    let tick_ms = env_u64("SYNAPLEX_TICK_MS", 200)?;

    let store: Arc<dyn SnapshotStore> = Arc::new(
        FileSnapshotStore::open(&config.snapshots.root)?
            .with_max_record_bytes(config.snapshots.max_record_bytes),
    );

    let mut runtime = Runtime::from_config(&config);
    runtime.register_agent(
        Box::new(Scribe::open(Arc::clone(&store))?),
        Some(AgentProfile::new("scribe", "writer").with_tool("notebook")),
        None,
    )?;
    runtime.register_agent(
        Box::new(Reader {
            id: AgentId::new("reader"),
            heard: 0,
            percept: None,
        }),
        Some(AgentProfile::new("reader", "observer").subscribe("scribe")),
        Some(Arc::new(FieldMatchLens::equals("notes-only", "type", json!("note")))),
    )?;
    runtime.validate_graph()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    tracing::info!(
        "world '{}' starting with {} agents (snapshots under {})",
        runtime.world_id(),
        runtime.agent_count(),
        config.snapshots.root.display()
    );

    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    let mut tick = 0u64;
    while !stop.load(Ordering::SeqCst) && (max_ticks == 0 || tick < max_ticks) {
        interval.tick().await;
        let report = runtime.tick(tick).await?;
        tracing::info!(
            tick = report.tick,
            signals = report.signals_committed,
            requests = report.requests_deferred,
            env_writes = report.env_keys_written.len(),
            faults = report.faults.len(),
            "tick complete"
        );
        tick += 1;
    }

    for (id, _) in runtime.agents() {
        if let Some(state) = runtime.visible_state(id) {
            tracing::info!("{}: {}", id, serde_json::Value::Object(state));
        }
    }
    tracing::info!(
        "{} ticks, {} irreversible actions, holonomy rate {:.3}",
        tick,
        runtime.holonomy_events().all().len(),
        runtime.holonomy_rate(None)
    );
    Ok(())
}
