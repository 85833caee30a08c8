use std::{io, sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use machine_learning::Learner;
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
    time,
};
use worker::{BuildEngine, Checkpoint, CheckpointErr, EngineConfig, ModelSnapshot};

use crate::error::Result;

/// A domain's engine together with its on disk cache.
pub(crate) struct DomainCache<L: Learner> {
    engine: Arc<BuildEngine<L>>,
    checkpoint: Checkpoint,
}

impl<L: Learner> DomainCache<L> {
    /// Opens a domain's cache and starts its engine from it.
    ///
    /// A cache that can't be read is logged and ignored, the engine then starts empty.
    pub(crate) fn open(
        checkpoint: Checkpoint,
        domain: &str,
        learner: &Arc<L>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let cached = match checkpoint.load() {
            Ok(cached) => cached,
            Err(e @ CheckpointErr::Corrupted { .. }) => {
                warn!(domain = domain; "ignoring cached model: {e}");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let restored = cached.and_then(|snapshot| {
            match BuildEngine::spawn_restored(Arc::clone(learner), config.clone(), &snapshot) {
                Ok(engine) => {
                    info!(domain = domain; "restored local model {}", snapshot.id());
                    Some(engine)
                }
                Err(e) => {
                    warn!(domain = domain; "ignoring cached model: {e}");
                    None
                }
            }
        });

        let engine = match restored {
            Some(engine) => engine,
            None => BuildEngine::spawn(domain, Arc::clone(learner), config.clone())?,
        };

        Ok(Self {
            engine: Arc::new(engine),
            checkpoint,
        })
    }

    pub(crate) fn engine(&self) -> &Arc<BuildEngine<L>> {
        &self.engine
    }

    /// Writes the local model on the blocking pool if it changed since the last write.
    ///
    /// # Arguments
    /// * `force` - Writes even if the model didn't change.
    pub(crate) async fn sync(self: &Arc<Self>, force: bool) -> Result<()> {
        if !self.engine.take_dirty() && !force {
            return Ok(());
        }

        let cache = Arc::clone(self);
        let written = match task::spawn_blocking(move || cache.write()).await {
            Ok(written) => written,
            Err(e) => Err(io::Error::other(e).into()),
        };
        if written.is_err() {
            self.engine.mark_dirty();
        }
        written
    }

    fn write(&self) -> Result<()> {
        let snapshot: ModelSnapshot = self.engine.snapshot()?;
        if !snapshot.is_initialized() {
            return Ok(());
        }

        self.checkpoint.save(&snapshot)?;
        debug!(domain = self.engine.domain(); "synced local model to {}", self.checkpoint.path().display());
        Ok(())
    }
}

/// Periodically writes the dirty local models of a node.
pub(crate) struct CacheSync {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CacheSync {
    pub(crate) fn spawn<L: Learner>(caches: Arc<Vec<Arc<DomainCache<L>>>>, every: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for cache in caches.iter() {
                            if let Err(e) = cache.sync(false).await {
                                error!(domain = cache.engine().domain(); "failed to sync local model: {e}");
                            }
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        Self { stop, task }
    }

    /// Stops the periodic writes, waiting for an ongoing one to finish.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!("cache sync task failed: {e}");
        }
    }
}
