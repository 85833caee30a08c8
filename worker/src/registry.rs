use std::{collections::HashMap, sync::Arc};

use log::warn;
use machine_learning::Learner;

use crate::{
    config::EngineConfig,
    engine::BuildEngine,
    error::{EngineErr, Result},
};

/// The domain used when a caller doesn't name one.
pub const DEFAULT_DOMAIN: &str = "$DEF";

/// Maps an empty or blank domain to `DEFAULT_DOMAIN`.
pub fn resolve_domain(domain: &str) -> &str {
    let domain = domain.trim();
    if domain.is_empty() {
        DEFAULT_DOMAIN
    } else {
        domain
    }
}

/// The build engines of a node, one per configured domain.
pub struct EngineRegistry<L: Learner> {
    engines: HashMap<String, Arc<BuildEngine<L>>>,
}

impl<L: Learner> Default for EngineRegistry<L> {
    fn default() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }
}

impl<L: Learner> EngineRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an empty engine for every domain.
    ///
    /// # Arguments
    /// * `domains` - The domains to train, an empty list means only the default domain.
    /// * `learner` - The algorithm shared by every engine.
    /// * `config` - The bounds of every engine.
    pub fn spawn<S: AsRef<str>>(domains: &[S], learner: Arc<L>, config: &EngineConfig) -> Result<Self> {
        let mut registry = Self::new();
        if domains.is_empty() {
            let engine = BuildEngine::spawn(DEFAULT_DOMAIN, Arc::clone(&learner), config.clone())?;
            registry.insert(engine);
        }

        for domain in domains {
            let domain = resolve_domain(domain.as_ref());
            if registry.contains(domain) {
                continue;
            }

            let engine = BuildEngine::spawn(domain, Arc::clone(&learner), config.clone())?;
            registry.insert(engine);
        }

        Ok(registry)
    }

    /// Registers an engine under its own domain, replacing any previous one.
    pub fn insert(&mut self, engine: impl Into<Arc<BuildEngine<L>>>) {
        let engine = engine.into();
        let domain = engine.domain().to_string();
        if self.engines.insert(domain, engine).is_some() {
            warn!("replaced an already registered build engine");
        }
    }

    /// Looks up the engine of a domain, resolving the default domain.
    ///
    /// # Returns
    /// The engine or `UnknownDomain` if it isn't registered.
    pub fn get(&self, domain: &str) -> Result<&Arc<BuildEngine<L>>> {
        let domain = resolve_domain(domain);
        self.engines
            .get(domain)
            .ok_or_else(|| EngineErr::UnknownDomain(domain.to_string()))
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.engines.contains_key(resolve_domain(domain))
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Shuts every engine down, returning the first failure after trying them all.
    pub async fn shutdown(&self) -> Result<()> {
        let mut first_err = None;
        for engine in self.engines.values() {
            if let Err(e) = engine.shutdown().await {
                warn!(domain = engine.domain(); "failed to shut down build engine: {e}");
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}
