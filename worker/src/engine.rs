use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use machine_learning::{Learner, TrainingBatch};
use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{self, error::SendTimeoutError},
    task,
};

use crate::{
    config::EngineConfig,
    error::{EngineErr, Result},
    gate::BuildGate,
    snapshot::ModelSnapshot,
};

enum Job {
    Batch(TrainingBatch),
    Poison,
}

/// The state shared between an engine's handle and its build consumer.
struct Core<L: Learner> {
    domain: String,
    learner: Arc<L>,
    gate: BuildGate,
    model: Mutex<Option<L::Model>>,
    built_at: Mutex<Option<DateTime<Utc>>>,
    absorbed: AtomicU64,
    dirty: AtomicBool,
}

impl<L: Learner> Core<L> {
    /// Absorbs a batch, the first one of the domain also shapes the model.
    fn increment_model(&self, batch: &TrainingBatch) -> machine_learning::Result<()> {
        let mut model = self.model.lock();
        if let Some(model) = model.as_mut() {
            self.learner.update(model, batch)?;
        } else {
            let mut built = self.learner.build(batch)?;
            self.learner.update(&mut built, batch)?;
            *model = Some(built);
            info!(domain = self.domain.as_str(); "model shape initialized from first batch");
        }

        *self.built_at.lock() = Some(Utc::now());
        self.absorbed.fetch_add(1, Ordering::AcqRel);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Serializes the current model, the caller must keep the consumer out.
    fn capture(&self) -> Result<ModelSnapshot> {
        let model = self.model.lock();
        let algorithm = self.learner.algorithm();
        let snapshot = match model.as_ref() {
            Some(model) => {
                let state = self.learner.serialize(model)?;
                ModelSnapshot::new(&self.domain, algorithm, state, *self.built_at.lock())
            }
            None => ModelSnapshot::uninitialized(&self.domain, algorithm),
        };

        Ok(snapshot)
    }
}

fn consume<L: Learner>(core: Arc<Core<L>>, mut rx: mpsc::Receiver<Job>) {
    debug!(domain = core.domain.as_str(); "build consumer started");

    while let Some(Job::Batch(batch)) = rx.blocking_recv() {
        let _permit = core.gate.enter();
        if let Err(e) = core.increment_model(&batch) {
            error!(domain = core.domain.as_str(); "skipping batch: {e}");
        }
    }

    debug!(domain = core.domain.as_str(); "build consumer stopped");
}

/// Owns the local model of a single domain.
///
/// Batches go through a bounded queue into a dedicated consumer thread, which is the
/// only writer of the model. Snapshots pause that thread between two batches, so they
/// never observe a half absorbed batch.
pub struct BuildEngine<L: Learner> {
    core: Arc<Core<L>>,
    config: EngineConfig,
    tx: mpsc::Sender<Job>,
    closed: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl<L: Learner> BuildEngine<L> {
    /// Starts the build consumer of a domain with an empty model.
    ///
    /// # Arguments
    /// * `domain` - The domain this engine trains.
    /// * `learner` - The algorithm used to build and update the model.
    /// * `config` - The queue and pause bounds.
    ///
    /// # Returns
    /// A running engine or an io error if the consumer thread couldn't be spawned.
    pub fn spawn(domain: impl Into<String>, learner: Arc<L>, config: EngineConfig) -> Result<Self> {
        Self::start(domain.into(), learner, config, None)
    }

    /// Starts the build consumer of a domain from a previously captured snapshot.
    ///
    /// Uninitialized snapshots start an empty model.
    pub fn spawn_restored(
        learner: Arc<L>,
        config: EngineConfig,
        snapshot: &ModelSnapshot,
    ) -> Result<Self> {
        let restored = if snapshot.is_initialized() {
            let model = learner.restore(snapshot.state())?;
            Some((model, snapshot.built_at()))
        } else {
            None
        };

        Self::start(snapshot.domain().to_string(), learner, config, restored)
    }

    fn start(
        domain: String,
        learner: Arc<L>,
        config: EngineConfig,
        restored: Option<(L::Model, Option<DateTime<Utc>>)>,
    ) -> Result<Self> {
        let (model, built_at) = match restored {
            Some((model, built_at)) => (Some(model), built_at),
            None => (None, None),
        };

        let core = Arc::new(Core {
            domain,
            learner,
            gate: BuildGate::new(),
            model: Mutex::new(model),
            built_at: Mutex::new(built_at),
            absorbed: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        });

        let (tx, rx) = mpsc::channel(config.backlog.max(1));
        let consumer = {
            let core = Arc::clone(&core);
            thread::Builder::new()
                .name(format!("build-{}", core.domain))
                .spawn(move || consume(core, rx))?
        };

        Ok(Self {
            core,
            config,
            tx,
            closed: AtomicBool::new(false),
            consumer: Mutex::new(Some(consumer)),
        })
    }

    pub fn domain(&self) -> &str {
        &self.core.domain
    }

    pub fn algorithm(&self) -> &str {
        self.core.learner.algorithm()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Offers a batch to the build queue, waiting at most the configured offer timeout.
    ///
    /// # Returns
    /// `QueueFull` carrying the batch back if there was no room in time,
    /// `ShutDown` if the engine no longer accepts batches.
    pub async fn offer(&self, batch: TrainingBatch) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.shut_down());
        }

        match self
            .tx
            .send_timeout(Job::Batch(batch), self.config.offer_timeout())
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(Job::Batch(batch))) => {
                Err(EngineErr::QueueFull(Box::new(batch)))
            }
            Err(_) => Err(self.shut_down()),
        }
    }

    /// Puts a batch in the build queue, retrying until there's room for it.
    ///
    /// Accepted batches are absorbed in the order they were enqueued.
    pub async fn enqueue(&self, mut batch: TrainingBatch) -> Result<()> {
        loop {
            match self.offer(batch).await {
                Err(EngineErr::QueueFull(rejected)) => {
                    trace!(domain = self.domain(); "build queue full, retrying");
                    batch = *rejected;
                }
                other => return other,
            }
        }
    }

    /// Captures the current model between two build steps.
    ///
    /// This blocks the calling thread for up to `pause_retries * pause_wait`.
    ///
    /// # Returns
    /// The snapshot, uninitialized if no batch was ever absorbed, or `FlushUnavailable`
    /// if the consumer couldn't be paused in time.
    pub fn snapshot(&self) -> Result<ModelSnapshot> {
        let retries = self.config.pause_retries;
        let Some(_paused) = self.core.gate.pause(retries, self.config.pause_wait()) else {
            warn!(domain = self.domain(); "giving up on snapshot, build consumer busy");
            return Err(EngineErr::FlushUnavailable {
                domain: self.domain().to_string(),
                retries,
            });
        };

        self.core.capture()
    }

    /// Whether the model changed since the last `take_dirty`.
    pub fn is_dirty(&self) -> bool {
        self.core.dirty.load(Ordering::Acquire)
    }

    /// Clears the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.core.dirty.swap(false, Ordering::AcqRel)
    }

    /// Marks the model as changed again, used when persisting it failed.
    pub fn mark_dirty(&self) {
        self.core.dirty.store(true, Ordering::Release);
    }

    /// The amount of batches absorbed since this engine started.
    pub fn absorbed(&self) -> u64 {
        self.core.absorbed.load(Ordering::Acquire)
    }

    /// When the last batch was absorbed.
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        *self.core.built_at.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting batches, drains the queue and waits for the consumer to exit.
    ///
    /// Calling it more than once is a no op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // The consumer is gone already if this fails, joining it is enough.
        let _ = self.tx.send(Job::Poison).await;

        let Some(consumer) = self.consumer.lock().take() else {
            return Ok(());
        };

        let joined = task::spawn_blocking(move || consumer.join()).await;
        match joined {
            Ok(Ok(())) => {
                info!(domain = self.domain(), absorbed = self.absorbed(); "build engine shut down");
                Ok(())
            }
            _ => Err(EngineErr::ConsumerPanicked {
                domain: self.domain().to_string(),
            }),
        }
    }

    fn shut_down(&self) -> EngineErr {
        EngineErr::ShutDown {
            domain: self.domain().to_string(),
        }
    }
}
