use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::runner::ConfigError;

/// Timing parameters of a run.
///
/// Loaded from JSON; missing fields keep their defaults.
///
/// ```json
/// { "tick_interval_ms": 100, "duration": 10, "shutdown_grace_ms": 500 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Milliseconds between two ticks.
    #[serde(alias = "TickTime")]
    pub tick_interval_ms: u64,
    /// Number of ticks before the clock stops.
    #[serde(alias = "Duration")]
    pub duration: u64,
    /// How long workers get to terminate on their own once the clock has stopped.
    pub shutdown_grace_ms: u64,
}

impl RunnerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[inline]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            duration: 10,
            shutdown_grace_ms: 500,
        }
    }
}
