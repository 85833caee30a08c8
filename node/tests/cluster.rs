use std::{fs, path::Path, sync::Arc, time::Duration};

use coordinator::{Cluster, CombineOutcome, LocalCluster};
use machine_learning::{
    TrainingBatch,
    mock::{Tally, TallyLearner},
};
use node::{Node, NodeConfig, NodeErr};
use worker::{CheckpointErr, DEFAULT_DOMAIN, EngineErr};

fn start(cluster: &LocalCluster, config: NodeConfig) -> node::Result<Node<TallyLearner>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let member: Arc<dyn Cluster> = Arc::new(cluster.join());
    Node::start(config, Arc::new(TallyLearner::new()), member)
}

fn cached(root: &Path) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.checkpoint.path = Some(root.to_path_buf());
    config
}

async fn train(node: &Node<TallyLearner>, domain: &str, labels: &[&str]) {
    for label in labels {
        node.enqueue(TrainingBatch::new(domain, label.to_string()))
            .await
            .unwrap();
    }

    let engine = node.engine(domain).unwrap();
    while engine.absorbed() < labels.len() as u64 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batches_without_domain_train_the_default_one() {
    let cluster = LocalCluster::new();
    let node = start(&cluster, NodeConfig::default()).unwrap();
    train(&node, "", &["pos", "neg"]).await;

    let snapshot = node.get_local_model("").await.unwrap();
    assert_eq!(snapshot.domain(), DEFAULT_DOMAIN);
    assert!(snapshot.is_initialized());
    assert_eq!(Tally::from_state(snapshot.state()).unwrap().observations(), 2);

    node.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_domain_is_rejected() {
    let cluster = LocalCluster::new();
    let config = NodeConfig {
        domains: vec!["sales".into()],
        ..NodeConfig::default()
    };
    let node = start(&cluster, config).unwrap();

    let err = node
        .enqueue(TrainingBatch::new("marketing", "pos"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeErr::Engine(EngineErr::UnknownDomain(_))));

    node.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_members_share_the_persisted_ensemble() {
    let cluster = LocalCluster::new();
    let a = start(&cluster, NodeConfig::default()).unwrap();
    let b = start(&cluster, NodeConfig::default()).unwrap();
    train(&a, "", &["pos"]).await;
    train(&b, "", &["neg", "neg"]).await;

    let (built, outcome) = a.spawn_retrieve("").await.unwrap().unwrap();
    assert_eq!(outcome, CombineOutcome::Created);

    let (read, outcome) = b.retrieve_model("", false).await.unwrap();
    assert_eq!(outcome, CombineOutcome::Ignored);
    assert_eq!(read.id(), built.id());

    let tally = Tally::from_state(read.state()).unwrap();
    assert_eq!(tally.labels["pos"], 1);
    assert_eq!(tally.labels["neg"], 2);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_model_survives_a_restart() {
    let root = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::new();

    let node = start(&cluster, cached(root.path())).unwrap();
    train(&node, "", &["pos", "pos", "neg"]).await;
    node.shutdown().await.unwrap();
    drop(node);

    let node = start(&cluster, cached(root.path())).unwrap();
    let snapshot = node.get_local_model("").await.unwrap();
    assert!(snapshot.is_initialized());
    assert!(snapshot.built_at().is_some());

    let tally = Tally::from_state(snapshot.state()).unwrap();
    assert_eq!(tally.labels["pos"], 2);
    assert_eq!(tally.batches, 3);

    train(&node, "", &["neg"]).await;
    let snapshot = node.get_local_model("").await.unwrap();
    assert_eq!(Tally::from_state(snapshot.state()).unwrap().batches, 4);
    node.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_is_locked_by_a_running_node() {
    let root = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::new();

    let node = start(&cluster, cached(root.path())).unwrap();
    let err = start(&cluster, cached(root.path())).err().unwrap();
    assert!(matches!(err, NodeErr::Checkpoint(CheckpointErr::Locked { .. })));

    node.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dirty_models_are_synced_periodically() {
    let root = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::new();
    let mut config = cached(root.path());
    config.checkpoint.sync_interval_secs = 1;

    let node = start(&cluster, config).unwrap();
    let file = root
        .path()
        .join("_supervised")
        .join("_domains")
        .join(DEFAULT_DOMAIN)
        .join("Tally.model");

    train(&node, "", &["pos"]).await;
    assert!(!file.exists());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(file.exists());
    assert!(!node.engine("").unwrap().is_dirty());

    node.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupted_cache_starts_an_empty_model() {
    let root = tempfile::tempdir().unwrap();
    let dir = root
        .path()
        .join("_supervised")
        .join("_domains")
        .join(DEFAULT_DOMAIN);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Tally.model"), b"{ not a model").unwrap();

    let cluster = LocalCluster::new();
    let node = start(&cluster, cached(root.path())).unwrap();

    let snapshot = node.get_local_model("").await.unwrap();
    assert!(!snapshot.is_initialized());
    node.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shut_down_member_leaves_the_cluster() {
    let cluster = LocalCluster::new();
    let mut config = NodeConfig::default();
    config.gather.snapshot_await_ms = 2_000;

    let a = start(&cluster, config.clone()).unwrap();
    let b = start(&cluster, config).unwrap();
    train(&b, "", &["pos"]).await;

    a.shutdown().await.unwrap();
    assert_eq!(cluster.members(), 1);

    let (result, outcome) = b.retrieve_model("", true).await.unwrap();
    assert_eq!(outcome, CombineOutcome::Created);
    assert_eq!(result.inputs(), 1);

    b.shutdown().await.unwrap();
    drop(a);
    assert_eq!(cluster.members(), 0);
}

#[tokio::test]
async fn test_shutdown_on_a_current_thread_runtime() {
    let root = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::new();

    let node = start(&cluster, cached(root.path())).unwrap();
    train(&node, "", &["pos"]).await;
    node.shutdown().await.unwrap();

    let file = root
        .path()
        .join("_supervised")
        .join("_domains")
        .join(DEFAULT_DOMAIN)
        .join("Tally.model");
    assert!(file.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_of_another_domain_is_ignored() {
    let root = tempfile::tempdir().unwrap();
    let domains = root.path().join("_supervised").join("_domains");
    let cluster = LocalCluster::new();

    let mut config = cached(root.path());
    config.domains = vec!["sales".into()];
    let node = start(&cluster, config).unwrap();
    train(&node, "sales", &["pos"]).await;
    node.shutdown().await.unwrap();
    drop(node);

    fs::create_dir_all(domains.join(DEFAULT_DOMAIN)).unwrap();
    fs::copy(
        domains.join("sales").join("Tally.model"),
        domains.join(DEFAULT_DOMAIN).join("Tally.model"),
    )
    .unwrap();

    let node = start(&cluster, cached(root.path())).unwrap();
    let snapshot = node.get_local_model("").await.unwrap();
    assert_eq!(snapshot.domain(), DEFAULT_DOMAIN);
    assert!(!snapshot.is_initialized());
    node.shutdown().await.unwrap();
}
