//! Runtime configuration for the job manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// How often each worker scans its queue for eligible jobs.
    pub tick_interval: Duration,
    /// Upper bound on a single request/reply exchange between actors.
    pub rpc_timeout: Duration,
    /// Buffer size of the broadcast channel behind `subscribe`.
    pub event_capacity: usize,
    /// Let `create_queue` replace an existing queue, dropping its pending jobs.
    pub replace_existing_queues: bool,
    /// Register a tracing sink for lifecycle events.
    pub log_events: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            rpc_timeout: Duration::from_secs(5),
            event_capacity: 1024,
            replace_existing_queues: false,
            log_events: true,
        }
    }
}

impl ManagerConfig {
    /// Build a config from `JOBQ_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from `JOBQ_*` keys resolved by `lookup`.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64, _>(&lookup, "JOBQ_TICK_INTERVAL_MS")? {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "JOBQ_RPC_TIMEOUT_MS")? {
            config.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse::<usize, _>(&lookup, "JOBQ_EVENT_CAPACITY")? {
            config.event_capacity = capacity;
        }
        if let Some(replace) = parse::<bool, _>(&lookup, "JOBQ_REPLACE_EXISTING_QUEUES")? {
            config.replace_existing_queues = replace;
        }
        if let Some(log) = parse::<bool, _>(&lookup, "JOBQ_LOG_EVENTS")? {
            config.log_events = log;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "tick_interval",
                value: format!("{:?}", self.tick_interval),
            });
        }
        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "rpc_timeout",
                value: format!("{:?}", self.rpc_timeout),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "event_capacity",
                value: self.event_capacity.to_string(),
            });
        }
        Ok(())
    }

    /// Set the worker tick interval.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Set the actor RPC timeout.
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    pub fn with_replace_existing_queues(mut self, replace: bool) -> Self {
        self.replace_existing_queues = replace;
        self
    }

    pub fn with_log_events(mut self, log_events: bool) -> Self {
        self.log_events = log_events;
        self
    }
}

fn parse<T, L>(lookup: &L, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}
