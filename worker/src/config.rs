use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Bounds of a domain's build engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The capacity of the build queue.
    pub backlog: usize,
    /// How long a single offer waits for room in the queue.
    pub offer_timeout_ms: u64,
    /// How many times a snapshot retries pausing the build consumer.
    pub pause_retries: usize,
    /// How long each of those retries waits.
    pub pause_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backlog: 1000,
            offer_timeout_ms: 100,
            pause_retries: 100,
            pause_wait_ms: 10,
        }
    }
}

impl EngineConfig {
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_millis(self.offer_timeout_ms)
    }

    pub fn pause_wait(&self) -> Duration {
        Duration::from_millis(self.pause_wait_ms)
    }
}

/// Where and how often the local models are cached on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// The root of the cache, `None` disables caching.
    pub path: Option<PathBuf>,
    /// How often dirty models are written.
    pub sync_interval_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: None,
            sync_interval_secs: 60,
        }
    }
}

impl CheckpointConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
