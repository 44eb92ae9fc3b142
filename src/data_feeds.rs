//! External structured data made available to every percept.
//!
//! Feeds are time-indexed: each tick the registry asks every feed whether it
//! has data and, if so, for that data. A feed that fails is skipped for the
//! tick; it never affects routing.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ConfigError;
use crate::ids::AgentId;
use crate::messages::Payload;

/// A named source of per-tick structured data.
pub trait DataFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Data for `tick`, optionally specialised for one agent.
    fn data(&self, tick: u64, agent: Option<&AgentId>) -> anyhow::Result<Payload>;

    fn is_available(&self, tick: u64) -> bool {
        let _ = tick;
        true
    }
}

/// Returns the same data every tick.
#[derive(Debug, Clone)]
pub struct StaticDataFeed {
    name: String,
    data: Payload,
}

impl StaticDataFeed {
    pub fn new(name: impl Into<String>, data: Payload) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl DataFeed for StaticDataFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self, _tick: u64, _agent: Option<&AgentId>) -> anyhow::Result<Payload> {
        Ok(self.data.clone())
    }
}

/// Per-tick data points with an optional fallback.
#[derive(Debug, Clone)]
pub struct TimeSeriesDataFeed {
    name: String,
    points: BTreeMap<u64, Payload>,
    default: Option<Payload>,
}

impl TimeSeriesDataFeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Payload) -> Self {
        self.default = Some(default);
        self
    }

    pub fn add_point(&mut self, tick: u64, data: Payload) {
        self.points.insert(tick, data);
    }
}

impl DataFeed for TimeSeriesDataFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self, tick: u64, _agent: Option<&AgentId>) -> anyhow::Result<Payload> {
        self.points
            .get(&tick)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no data point for tick {}", tick))
    }

    fn is_available(&self, tick: u64) -> bool {
        self.points.contains_key(&tick) || self.default.is_some()
    }
}

type Getter = Box<dyn Fn(u64, Option<&AgentId>) -> anyhow::Result<Payload> + Send + Sync>;
type Availability = Box<dyn Fn(u64) -> bool + Send + Sync>;

/// Calls a function for its data.
pub struct CallableDataFeed {
    name: String,
    getter: Getter,
    availability: Option<Availability>,
}

impl CallableDataFeed {
    pub fn new<F>(name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(u64, Option<&AgentId>) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            getter: Box::new(getter),
            availability: None,
        }
    }

    pub fn available_when<F>(mut self, check: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        self.availability = Some(Box::new(check));
        self
    }
}

impl std::fmt::Debug for CallableDataFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableDataFeed")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl DataFeed for CallableDataFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self, tick: u64, agent: Option<&AgentId>) -> anyhow::Result<Payload> {
        (self.getter)(tick, agent)
    }

    fn is_available(&self, tick: u64) -> bool {
        self.availability.as_ref().map_or(true, |check| check(tick))
    }
}

/// Feeds registered with a world, in registration order.
#[derive(Default)]
pub struct DataFeedRegistry {
    feeds: Vec<Box<dyn DataFeed>>,
}

impl DataFeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, feed: Box<dyn DataFeed>) -> Result<(), ConfigError> {
        if self.get(feed.name()).is_some() {
            return Err(ConfigError::Invalid {
                key: "data_feeds".to_string(),
                message: format!("data feed '{}' is already registered", feed.name()),
            });
        }
        self.feeds.push(feed);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn DataFeed> {
        self.feeds.iter().find(|f| f.name() == name).map(|f| f.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.feeds.iter().map(|f| f.name()).collect()
    }

    /// Data from every available feed for `tick`, keyed by feed name.
    pub fn collect(&self, tick: u64, agent: Option<&AgentId>) -> Payload {
        let mut out = Payload::new();
        for feed in self.feeds.iter().filter(|f| f.is_available(tick)) {
            match feed.data(tick, agent) {
                Ok(data) => {
                    out.insert(feed.name().to_string(), Value::Object(data));
                }
                Err(e) => {
                    log::warn!("data feed '{}' failed at tick {}: {}", feed.name(), tick, e);
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for DataFeedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFeedRegistry")
            .field("feeds", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
