use std::time::Duration;

use machine_learning::Combiner;
use serde::{Deserialize, Serialize};

/// How gather rounds are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatherConfig {
    pub combiner: Combiner,
    /// Free form options handed to the combiner.
    pub combiner_options: Option<String>,
    /// How long the initiator waits for every member to acknowledge.
    pub snapshot_await_ms: u64,
    /// How long the initiator waits for the domain's lock.
    pub lock_timeout_ms: u64,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            combiner: Combiner::default(),
            combiner_options: None,
            snapshot_await_ms: 600_000,
            lock_timeout_ms: 1000,
        }
    }
}

impl GatherConfig {
    pub fn snapshot_await(&self) -> Duration {
        Duration::from_millis(self.snapshot_await_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
