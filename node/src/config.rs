use std::{
    fs,
    path::{Path, PathBuf},
};

use coordinator::GatherConfig;
use serde::{Deserialize, Serialize};
use worker::{CheckpointConfig, DEFAULT_DOMAIN, EngineConfig, resolve_domain};

use crate::error::{NodeErr, Result};

/// Everything a node needs to start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// The domains trained by this node, none means only the default domain.
    pub domains: Vec<String>,
    pub engine: EngineConfig,
    pub gather: GatherConfig,
    pub checkpoint: CheckpointConfig,
    /// The evaluation set of the `EVALUATING` combiner.
    pub evaluation_path: Option<PathBuf>,
}

impl NodeConfig {
    /// Parses a JSON config, missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NodeErr::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The configured domains with the default domain resolved and duplicates removed.
    pub fn resolved_domains(&self) -> Vec<String> {
        if self.domains.is_empty() {
            return vec![DEFAULT_DOMAIN.to_string()];
        }

        let mut domains: Vec<String> = Vec::with_capacity(self.domains.len());
        for domain in &self.domains {
            let domain = resolve_domain(domain);
            if !domains.iter().any(|known| known == domain) {
                domains.push(domain.to_string());
            }
        }

        domains
    }

    /// Checks the config before a node starts with it.
    pub fn validate(&self) -> Result<()> {
        if self.engine.backlog == 0 {
            return Err(NodeErr::InvalidConfig("backlog must be positive".into()));
        }

        if self.gather.snapshot_await_ms == 0 {
            return Err(NodeErr::InvalidConfig(
                "snapshot await must be positive".into(),
            ));
        }

        if self.gather.combiner.requires_evaluation() && self.evaluation_path.is_none() {
            return Err(NodeErr::InvalidConfig(format!(
                "combiner {} needs an evaluation set",
                self.gather.combiner
            )));
        }

        if self.checkpoint.path.is_some() {
            if self.checkpoint.sync_interval_secs == 0 {
                return Err(NodeErr::InvalidConfig(
                    "checkpoint sync interval must be positive".into(),
                ));
            }

            // Domains name the cache directories.
            for domain in self.resolved_domains() {
                if domain.contains(['/', '\\']) || domain == "." || domain == ".." {
                    return Err(NodeErr::InvalidConfig(format!(
                        "domain {domain} can't be used as a cache directory"
                    )));
                }
            }
        }

        Ok(())
    }
}
