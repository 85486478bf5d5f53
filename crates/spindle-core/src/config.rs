//! Config - ワーカーとプールの設定
//!
//! Both configs deserialize from JSON with every field optional; missing
//! fields fall back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Poll cadence used by every bounded wait (~30 checks per second).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000 / 30;

/// Default tick rate of a [`PeriodicWorker`](crate::worker::PeriodicWorker).
pub const DEFAULT_FREQUENCY_HZ: u32 = 30;

/// Grace period for pending threads to drain after shutdown is requested.
pub const DEFAULT_DRAIN_GRACE_MS: u64 = 2000;

/// Grace period for the reaper to report completion after draining.
pub const DEFAULT_REAPER_GRACE_MS: u64 = 1000;

/// Settings for a [`PeriodicWorker`](crate::worker::PeriodicWorker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Initial tick rate; can be changed later with `set_frequency`.
    pub frequency_hz: u32,

    /// Cadence at which `halt` checks whether the loop has stopped.
    pub poll_interval_ms: u64,

    /// Budget for the implicit halt performed when a running worker is dropped.
    pub drop_halt_timeout_ms: u64,

    /// Name given to the loop thread.
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            drop_halt_timeout_ms: DEFAULT_DRAIN_GRACE_MS,
            thread_name: "spindle-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_frequency(mut self, hz: u32) -> Self {
        self.frequency_hz = hz;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = as_millis(interval);
        self
    }

    pub fn with_drop_halt_timeout(mut self, timeout: Duration) -> Self {
        self.drop_halt_timeout_ms = as_millis(timeout);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drop_halt_timeout(&self) -> Duration {
        Duration::from_millis(self.drop_halt_timeout_ms)
    }

    /// Fail-fast check, run by `PeriodicWorker::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency_hz == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "poll_interval_ms",
            });
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for a [`ThreadPool`](crate::pool::ThreadPool).
///
/// The grace periods bound how long shutdown may block; a stuck thread
/// costs at most `drain_grace + reaper_grace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on how long the idle reaper sleeps between queue checks.
    pub poll_interval_ms: u64,

    pub drain_grace_ms: u64,

    pub reaper_grace_ms: u64,

    /// How many `ReapRecord`s are retained (oldest dropped first).
    pub history_capacity: usize,

    /// Prefix for the reaper (`<prefix>-reaper`) and submitted threads (`<prefix>-<id>`).
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            drain_grace_ms: DEFAULT_DRAIN_GRACE_MS,
            reaper_grace_ms: DEFAULT_REAPER_GRACE_MS,
            history_capacity: 256,
            thread_name_prefix: "spindle".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = as_millis(interval);
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace_ms = as_millis(grace);
        self
    }

    pub fn with_reaper_grace(mut self, grace: Duration) -> Self {
        self.reaper_grace_ms = as_millis(grace);
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn reaper_grace(&self) -> Duration {
        Duration::from_millis(self.reaper_grace_ms)
    }

    /// Zero grace periods are allowed (shutdown then only checks once).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "poll_interval_ms",
            });
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
