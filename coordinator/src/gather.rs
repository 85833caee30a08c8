use std::{io, sync::Arc};

use comms::{Deserialize, Signal, SignalKind};
use futures::StreamExt;
use log::{debug, error, info, warn};
use machine_learning::{EvaluationSet, Learner, MlErr};
use tokio::task::{self, JoinHandle};
use worker::{EngineRegistry, ModelSnapshot, resolve_domain};

use crate::{
    cluster::Cluster,
    config::GatherConfig,
    error::{GatherErr, Result},
    outcome::CombineOutcome,
    result::EnsembleResult,
    rounds::PendingRounds,
    store::EnsembleStore,
};

/// Runs gather rounds for the domains of a node and answers the rounds of the others.
pub struct Coordinator<L: Learner> {
    learner: Arc<L>,
    engines: Arc<EngineRegistry<L>>,
    cluster: Arc<dyn Cluster>,
    store: EnsembleStore,
    rounds: Arc<PendingRounds>,
    config: GatherConfig,
    evaluation: Option<EvaluationSet>,
}

impl<L: Learner> Coordinator<L> {
    /// Creates a new `Coordinator`.
    ///
    /// # Arguments
    /// * `learner` - Combines the gathered snapshots.
    /// * `engines` - The local build engines, answering dump requests.
    /// * `cluster` - This member's handle on the cluster.
    /// * `config` - The combiner and the round's timeouts.
    pub fn new(
        learner: Arc<L>,
        engines: Arc<EngineRegistry<L>>,
        cluster: Arc<dyn Cluster>,
        config: GatherConfig,
    ) -> Self {
        let store = EnsembleStore::new(Arc::clone(&cluster), learner.algorithm(), config.combiner);

        Self {
            learner,
            engines,
            cluster,
            store,
            rounds: Arc::new(PendingRounds::new()),
            config,
            evaluation: None,
        }
    }

    /// Sets the evaluation set used by the `EVALUATING` combiner.
    pub fn with_evaluation(mut self, evaluation: EvaluationSet) -> Self {
        self.evaluation = Some(evaluation);
        self
    }

    pub fn store(&self) -> &EnsembleStore {
        &self.store
    }

    pub fn engines(&self) -> &Arc<EngineRegistry<L>> {
        &self.engines
    }

    /// Leaves the cluster, later rounds of other members stop waiting for this one.
    pub fn leave(&self) {
        self.cluster.leave();
    }

    /// Starts answering cluster signals.
    ///
    /// The subscription is taken before returning, so rounds started afterwards are
    /// always seen by this member.
    ///
    /// # Returns
    /// The handle of the listening task.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let mut frames = self.cluster.subscribe();
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                let signal = match Signal::deserialize(&frame) {
                    Ok(signal) => signal,
                    Err(e) => {
                        warn!("dropping malformed signal: {e}");
                        continue;
                    }
                };

                match signal.kind {
                    SignalKind::DumpRequest => {
                        let coordinator = Arc::clone(&coordinator);
                        let domain = signal.domain.to_string();
                        tokio::spawn(async move { coordinator.dump(&domain).await });
                    }
                    SignalKind::DumpResponse => {
                        coordinator.rounds.acknowledge(signal.domain);
                    }
                }
            }

            debug!("cluster subscription closed");
        })
    }

    /// Answers a dump request, always acknowledging it once the snapshot is handled.
    async fn dump(&self, domain: &str) {
        match self.local_snapshot(domain).await {
            Ok(snapshot) if snapshot.is_initialized() => {
                debug!(domain = domain; "depositing snapshot {}", snapshot.id());
                self.cluster.add_snapshot(domain, snapshot).await;
            }
            Ok(_) => debug!(domain = domain; "local model not initialized, nothing to deposit"),
            Err(GatherErr::UnknownDomain(_)) => {
                debug!(domain = domain; "no local engine for the requested domain");
            }
            Err(e) => error!(domain = domain; "failed to flush local model: {e}"),
        }

        let frame = comms::to_bytes(&Signal::dump_response(domain));
        if let Err(e) = self.cluster.publish(frame).await {
            error!(domain = domain; "failed to acknowledge dump request: {e}");
        }
    }

    /// Captures the local model of a domain without blocking the runtime.
    pub async fn local_snapshot(&self, domain: &str) -> Result<ModelSnapshot> {
        let engine = Arc::clone(self.engines.get(domain)?);
        let snapshot = task::spawn_blocking(move || engine.snapshot())
            .await
            .map_err(io::Error::other)??;

        Ok(snapshot)
    }

    /// Runs a gather round for a domain.
    ///
    /// Every member deposits its local snapshot, the initiator combines them and
    /// persists the result unless an identical ensemble exists already.
    ///
    /// # Arguments
    /// * `domain` - The domain to combine, empty for the default one.
    ///
    /// # Returns
    /// How the round ended or the error that stopped it.
    pub async fn combine(&self, domain: &str) -> Result<CombineOutcome> {
        let domain = resolve_domain(domain);
        self.engines.get(domain)?;

        if self.config.combiner.requires_evaluation() && self.evaluation.is_none() {
            return Err(MlErr::EvaluationSetRequired.into());
        }

        let key = self.store.key(domain);
        let Some(_lock) = self.cluster.try_lock(&key, self.config.lock_timeout()).await else {
            info!(domain = domain; "another round holds the lock, ignoring");
            return Ok(CombineOutcome::Ignored);
        };

        let stale = self.cluster.drain_snapshots(domain).await;
        if !stale.is_empty() {
            debug!(domain = domain; "discarded {} stale snapshots", stale.len());
        }

        let expected = self.cluster.members();
        let mut ticket = self.rounds.open(domain);
        let request = comms::to_bytes(&Signal::dump_request(domain));
        self.cluster.publish(request).await?;
        info!(domain = domain, members = expected; "requested snapshots");

        if !ticket.wait(expected, self.config.snapshot_await()).await {
            warn!(domain = domain; "timed out waiting for snapshots");
            return Ok(CombineOutcome::Timeout);
        }
        drop(ticket);

        let snapshots = self.cluster.drain_snapshots(domain).await;
        if snapshots.is_empty() {
            return Err(GatherErr::EmptySnapshotSet {
                domain: domain.to_string(),
            });
        }

        let snapshots: Vec<_> = snapshots
            .into_iter()
            .filter(ModelSnapshot::is_initialized)
            .collect();
        if snapshots.is_empty() {
            return Err(GatherErr::NoInitializedModels {
                domain: domain.to_string(),
            });
        }

        let result = self.ensemble(domain, snapshots).await?;
        let persisted = self.store.persist(result).await;
        Ok(persisted.into())
    }

    async fn ensemble(&self, domain: &str, snapshots: Vec<ModelSnapshot>) -> Result<EnsembleResult> {
        let learner = Arc::clone(&self.learner);
        let combiner = self.config.combiner;
        let options = self.config.combiner_options.clone();
        let evaluation = self.evaluation.clone();
        let inputs = snapshots.len();
        info!(domain = domain, inputs = inputs; "combining snapshots with {combiner}");

        let state = task::spawn_blocking(move || {
            let states: Vec<&[u8]> = snapshots.iter().map(ModelSnapshot::state).collect();
            learner.combine(combiner, options.as_deref(), &states, evaluation.as_ref())
        })
        .await
        .map_err(io::Error::other)??;

        let algorithm = self.learner.algorithm();
        Ok(EnsembleResult::new(domain, algorithm, combiner, state, inputs))
    }

    /// Returns the current ensemble of a domain, running a round first if asked to or
    /// if nothing was persisted yet.
    ///
    /// # Arguments
    /// * `domain` - The domain to read, empty for the default one.
    /// * `build_now` - Whether to force a new round.
    ///
    /// # Returns
    /// The current ensemble with the outcome of the round, `Ignored` if none ran.
    pub async fn retrieve_model(
        &self,
        domain: &str,
        build_now: bool,
    ) -> Result<(EnsembleResult, CombineOutcome)> {
        let domain = resolve_domain(domain);
        self.engines.get(domain)?;

        let mut outcome = CombineOutcome::Ignored;
        if build_now || self.store.latest(domain).await.is_none() {
            outcome = self.combine(domain).await?;
        }

        let latest = self
            .store
            .latest(domain)
            .await
            .ok_or_else(|| GatherErr::NotFound {
                domain: domain.to_string(),
            })?;

        Ok((latest, outcome))
    }
}
