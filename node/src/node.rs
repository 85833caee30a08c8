use std::{fs, sync::Arc};

use coordinator::{Cluster, CombineOutcome, Coordinator, EnsembleResult, GatherErr};
use log::{error, info};
use machine_learning::{EvaluationSet, Learner, TrainingBatch};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use worker::{BuildEngine, Checkpoint, EngineRegistry, ModelSnapshot, resolve_domain};

use crate::{
    cache::{CacheSync, DomainCache},
    config::NodeConfig,
    error::Result,
};

/// A cluster member training every configured domain.
///
/// Batches are routed to the domain's build engine, ensembles are gathered from every
/// member of the cluster through the coordinator.
pub struct Node<L: Learner> {
    engines: Arc<EngineRegistry<L>>,
    coordinator: Arc<Coordinator<L>>,
    caches: Arc<Vec<Arc<DomainCache<L>>>>,
    listener: JoinHandle<()>,
    sync: Mutex<Option<CacheSync>>,
}

impl<L: Learner> Node<L> {
    /// Starts a node and joins it to the cluster.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Arguments
    /// * `config` - The node's configuration, validated before anything starts.
    /// * `learner` - The algorithm shared by every domain.
    /// * `cluster` - This member's handle on the cluster.
    ///
    /// # Returns
    /// The running node or the error that kept it from starting.
    pub fn start(config: NodeConfig, learner: Arc<L>, cluster: Arc<dyn Cluster>) -> Result<Self> {
        config.validate()?;
        let domains = config.resolved_domains();

        let mut engines = EngineRegistry::new();
        let mut caches = Vec::new();
        match &config.checkpoint.path {
            Some(root) => {
                for domain in &domains {
                    let checkpoint = Checkpoint::open(root, domain, learner.algorithm())?;
                    let cache = DomainCache::open(checkpoint, domain, &learner, &config.engine)?;
                    engines.insert(Arc::clone(cache.engine()));
                    caches.push(Arc::new(cache));
                }
            }
            None => {
                for domain in &domains {
                    let engine =
                        BuildEngine::spawn(domain.as_str(), Arc::clone(&learner), config.engine.clone())?;
                    engines.insert(engine);
                }
            }
        }

        let caches = Arc::new(caches);
        let engines = Arc::new(engines);

        let mut coordinator = Coordinator::new(learner, Arc::clone(&engines), cluster, config.gather.clone());
        if let Some(path) = &config.evaluation_path {
            coordinator = coordinator.with_evaluation(EvaluationSet::new(fs::read(path)?));
        }

        let coordinator = Arc::new(coordinator);
        let listener = coordinator.listen();

        let sync = (!caches.is_empty())
            .then(|| CacheSync::spawn(Arc::clone(&caches), config.checkpoint.sync_interval()));

        info!(domains = domains.len(); "node started");
        Ok(Self {
            engines,
            coordinator,
            caches,
            listener,
            sync: Mutex::new(sync),
        })
    }

    /// The build engine of a domain, empty for the default one.
    pub fn engine(&self, domain: &str) -> Result<&Arc<BuildEngine<L>>> {
        Ok(self.engines.get(domain)?)
    }

    pub fn coordinator(&self) -> &Arc<Coordinator<L>> {
        &self.coordinator
    }

    /// Routes a batch to its domain's build engine, waiting for room in its queue.
    pub async fn enqueue(&self, batch: TrainingBatch) -> Result<()> {
        let domain = resolve_domain(batch.domain()).to_string();
        let batch = if domain == batch.domain() {
            batch
        } else {
            batch.with_domain(domain.as_str())
        };

        self.engines.get(&domain)?.enqueue(batch).await?;
        Ok(())
    }

    /// Returns the current ensemble of a domain, see `Coordinator::retrieve_model`.
    pub async fn retrieve_model(
        &self,
        domain: &str,
        build_now: bool,
    ) -> Result<(EnsembleResult, CombineOutcome)> {
        Ok(self.coordinator.retrieve_model(domain, build_now).await?)
    }

    /// Runs a forced retrieval in the background.
    ///
    /// # Returns
    /// The handle of the task running it.
    pub fn spawn_retrieve(
        &self,
        domain: &str,
    ) -> JoinHandle<std::result::Result<(EnsembleResult, CombineOutcome), GatherErr>> {
        let coordinator = Arc::clone(&self.coordinator);
        let domain = domain.to_string();
        tokio::spawn(async move { coordinator.retrieve_model(&domain, true).await })
    }

    /// Captures this node's own model of a domain.
    pub async fn get_local_model(&self, domain: &str) -> Result<ModelSnapshot> {
        Ok(self.coordinator.local_snapshot(domain).await?)
    }

    /// Drains every build queue, writes the cached models one last time, leaves the
    /// cluster and stops answering it.
    pub async fn shutdown(&self) -> Result<()> {
        let drained = self.engines.shutdown().await;

        let sync = self.sync.lock().take();
        if let Some(sync) = sync {
            sync.stop().await;
        }

        for cache in self.caches.iter() {
            if let Err(e) = cache.sync(true).await {
                error!(domain = cache.engine().domain(); "failed to write local model: {e}");
            }
        }

        self.coordinator.leave();
        self.listener.abort();
        drained?;
        info!("node shut down");
        Ok(())
    }
}

impl<L: Learner> Drop for Node<L> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
