use std::{sync::Arc, time::Duration};

use coordinator::{Cluster, CombineOutcome, Coordinator, GatherConfig, GatherErr, LocalCluster};
use machine_learning::{
    Combiner, EvaluationSet, MlErr, TrainingBatch,
    mock::{Tally, TallyLearner},
};
use tokio::task::JoinHandle;
use worker::{BuildEngine, EngineConfig, EngineRegistry};

const DOMAIN: &str = "sales";

struct Member {
    learner: Arc<TallyLearner>,
    coordinator: Arc<Coordinator<TallyLearner>>,
    listener: JoinHandle<()>,
}

impl Member {
    fn join(cluster: &LocalCluster, learner: TallyLearner, config: GatherConfig) -> Self {
        Self::join_with(cluster, learner, &[DOMAIN], &EngineConfig::default(), config)
    }

    fn join_with(
        cluster: &LocalCluster,
        learner: TallyLearner,
        domains: &[&str],
        engine: &EngineConfig,
        config: GatherConfig,
    ) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let learner = Arc::new(learner);
        let engines = EngineRegistry::spawn(domains, Arc::clone(&learner), engine).unwrap();
        let cluster: Arc<dyn Cluster> = Arc::new(cluster.join());
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&learner),
            Arc::new(engines),
            cluster,
            config,
        ));
        let listener = coordinator.listen();

        Self {
            learner,
            coordinator,
            listener,
        }
    }

    fn engine(&self) -> &Arc<BuildEngine<TallyLearner>> {
        self.coordinator.engines().get(DOMAIN).unwrap()
    }

    async fn train(&self, labels: &[&str]) {
        for label in labels {
            self.engine()
                .enqueue(TrainingBatch::new(DOMAIN, label.to_string()))
                .await
                .unwrap();
        }
    }

    /// Waits until every enqueued batch was absorbed.
    async fn settle(&self, absorbed: u64) {
        while self.engine().absorbed() < absorbed {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn config() -> GatherConfig {
    GatherConfig {
        snapshot_await_ms: 2_000,
        lock_timeout_ms: 50,
        ..GatherConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unchanged_models_persist_once() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::new(), config());
    let b = Member::join(&cluster, TallyLearner::new(), config());
    a.train(&["pos", "neg"]).await;
    b.train(&["pos"]).await;
    a.settle(2).await;
    b.settle(1).await;

    let first = a.coordinator.combine(DOMAIN).await.unwrap();
    let second = a.coordinator.combine(DOMAIN).await.unwrap();

    assert_eq!(first, CombineOutcome::Created);
    assert_eq!(second, CombineOutcome::Exists);
    assert_eq!(a.coordinator.store().log(DOMAIN).await.len(), 1);
    assert_eq!(a.learner.combines(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_identical_members_and_an_empty_one() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::new(), config());
    let b = Member::join(&cluster, TallyLearner::new(), config());
    let c = Member::join(&cluster, TallyLearner::new(), config());
    a.train(&["pos", "neg"]).await;
    b.train(&["pos", "neg"]).await;
    a.settle(2).await;
    b.settle(2).await;

    let (result, outcome) = c.coordinator.retrieve_model(DOMAIN, true).await.unwrap();

    assert_eq!(outcome, CombineOutcome::Created);
    assert_eq!(c.learner.combines(), 1);
    assert_eq!(c.learner.last_inputs(), 2);
    assert_eq!(result.inputs(), 2);
    assert_eq!(c.coordinator.store().log(DOMAIN).await.len(), 1);

    let tally = Tally::from_state(result.state()).unwrap();
    assert_eq!(tally.labels["pos"], 2);
    assert_eq!(tally.batches, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_member_times_out_the_round() {
    let cluster = LocalCluster::new();
    let config = GatherConfig {
        snapshot_await_ms: 100,
        ..config()
    };
    let a = Member::join(&cluster, TallyLearner::new(), config);
    a.train(&["pos"]).await;
    a.settle(1).await;

    let silent = cluster.join();
    assert_eq!(a.coordinator.combine(DOMAIN).await.unwrap(), CombineOutcome::Timeout);

    drop(silent);
    assert_eq!(a.coordinator.combine(DOMAIN).await.unwrap(), CombineOutcome::Created);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_rounds_are_mutually_exclusive() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::slow(Duration::from_millis(300)), config());
    let b = Member::join(&cluster, TallyLearner::new(), config());
    b.train(&["pos"]).await;
    b.settle(1).await;

    // Keeps a's snapshot waiting on a build step for most of the round.
    a.train(&["pos"]).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (ra, rb) = tokio::join!(a.coordinator.combine(DOMAIN), b.coordinator.combine(DOMAIN));

    let mut outcomes = vec![ra.unwrap(), rb.unwrap()];
    outcomes.sort_by_key(|outcome| *outcome == CombineOutcome::Ignored);
    assert_eq!(outcomes, vec![CombineOutcome::Created, CombineOutcome::Ignored]);
    assert_eq!(a.learner.combines() + b.learner.combines(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rounds_start_from_an_empty_collection() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::new(), config());
    let stale = Member::join(&cluster, TallyLearner::new(), config());
    a.train(&["pos"]).await;
    stale.train(&["neg", "neg", "neg"]).await;
    a.settle(1).await;
    stale.settle(3).await;

    // A deposit left behind by an abandoned round.
    let leftover = stale.coordinator.local_snapshot(DOMAIN).await.unwrap();
    let substrate = cluster.join();
    substrate.add_snapshot(DOMAIN, leftover).await;
    drop(substrate);

    drop(stale);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (result, outcome) = a.coordinator.retrieve_model(DOMAIN, true).await.unwrap();
    assert_eq!(outcome, CombineOutcome::Created);
    assert_eq!(a.learner.last_inputs(), 1);

    let tally = Tally::from_state(result.state()).unwrap();
    assert!(!tally.labels.contains_key("neg"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_uninitialized_cluster_has_nothing_to_combine() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::new(), config());
    let _b = Member::join(&cluster, TallyLearner::new(), config());

    let err = a.coordinator.retrieve_model(DOMAIN, false).await.unwrap_err();
    assert!(matches!(err, GatherErr::EmptySnapshotSet { .. }));
    assert_eq!(a.learner.combines(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retrieve_reuses_the_persisted_ensemble() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::new(), config());
    a.train(&["pos"]).await;
    a.settle(1).await;

    let (_, first) = a.coordinator.retrieve_model("sales", false).await.unwrap();
    let (result, second) = a.coordinator.retrieve_model("sales", false).await.unwrap();

    assert_eq!(first, CombineOutcome::Created);
    assert_eq!(second, CombineOutcome::Ignored);
    assert_eq!(result.combiner(), Combiner::Voting);
    assert_eq!(a.learner.combines(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_domain_fails_fast() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::new(), config());

    let err = a.coordinator.combine("marketing").await.unwrap_err();
    assert!(matches!(err, GatherErr::UnknownDomain(domain) if domain == "marketing"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_evaluating_combiner_needs_an_evaluation_set() {
    let cluster = LocalCluster::new();
    let config = GatherConfig {
        combiner: Combiner::Evaluating,
        ..config()
    };
    let a = Member::join(&cluster, TallyLearner::new(), config);
    a.train(&["pos"]).await;
    a.settle(1).await;

    let err = a.coordinator.combine(DOMAIN).await.unwrap_err();
    assert!(matches!(err, GatherErr::Combine(MlErr::EvaluationSetRequired)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_evaluating_combiner_picks_the_best_member() {
    let cluster = LocalCluster::new();
    let config = GatherConfig {
        combiner: Combiner::Evaluating,
        ..config()
    };

    let learner = Arc::new(TallyLearner::new());
    let engines = EngineRegistry::spawn(&[DOMAIN], Arc::clone(&learner), &EngineConfig::default())
        .unwrap();
    let member: Arc<dyn Cluster> = Arc::new(cluster.join());
    let a = Arc::new(
        Coordinator::new(learner, Arc::new(engines), member, config.clone())
            .with_evaluation(EvaluationSet::new("pos")),
    );
    let listener = a.listen();

    let b = Member::join(&cluster, TallyLearner::new(), config);
    b.train(&["pos", "pos", "neg"]).await;
    b.settle(3).await;
    let engine = a.engines().get(DOMAIN).unwrap();
    engine.enqueue(TrainingBatch::new(DOMAIN, "neg")).await.unwrap();
    while engine.absorbed() < 1 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (result, outcome) = a.retrieve_model(DOMAIN, true).await.unwrap();
    assert_eq!(outcome, CombineOutcome::Created);
    assert_eq!(result.inputs(), 2);

    let tally = Tally::from_state(result.state()).unwrap();
    assert_eq!(tally.labels["pos"], 2);
    listener.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_member_that_cannot_flush_still_acknowledges() {
    let cluster = LocalCluster::new();
    let impatient = EngineConfig {
        pause_retries: 1,
        pause_wait_ms: 1,
        ..EngineConfig::default()
    };
    let busy = Member::join_with(
        &cluster,
        TallyLearner::slow(Duration::from_millis(500)),
        &[DOMAIN],
        &impatient,
        config(),
    );
    let a = Member::join(&cluster, TallyLearner::new(), config());
    a.train(&["pos"]).await;
    a.settle(1).await;

    // The second batch keeps the busy member's gate in a build step.
    busy.train(&["neg"]).await;
    busy.settle(1).await;
    busy.train(&["neg"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = a.coordinator.combine(DOMAIN).await.unwrap();
    assert_eq!(outcome, CombineOutcome::Created);
    assert_eq!(a.learner.last_inputs(), 1);

    let (result, _) = a.coordinator.retrieve_model(DOMAIN, false).await.unwrap();
    let tally = Tally::from_state(result.state()).unwrap();
    assert!(!tally.labels.contains_key("neg"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_member_without_the_domain_still_acknowledges() {
    let cluster = LocalCluster::new();
    let a = Member::join(&cluster, TallyLearner::new(), config());
    let other = Member::join_with(
        &cluster,
        TallyLearner::new(),
        &["marketing"],
        &EngineConfig::default(),
        config(),
    );
    a.train(&["pos"]).await;
    a.settle(1).await;

    let outcome = a.coordinator.combine(DOMAIN).await.unwrap();
    assert_eq!(outcome, CombineOutcome::Created);
    assert_eq!(a.learner.last_inputs(), 1);
    assert_eq!(other.learner.combines(), 0);
}
