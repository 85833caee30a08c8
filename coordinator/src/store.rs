use std::sync::Arc;

use log::{debug, info};
use machine_learning::Combiner;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use worker::ContentId;

use crate::{cluster::Cluster, result::EnsembleResult};

/// The persisted ensembles of a domain, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleLog {
    entries: Vec<(Uuid, EnsembleResult)>,
}

impl EnsembleLog {
    /// Looks for an ensemble with the given identity.
    pub fn find(&self, id: &ContentId) -> Option<Uuid> {
        self.entries
            .iter()
            .find(|(_, result)| result.id() == id)
            .map(|(key, _)| *key)
    }

    /// Appends a result under a new time ordered key.
    pub fn append(&mut self, result: EnsembleResult) -> Uuid {
        let key = Uuid::now_v7();
        self.entries.push((key, result));
        key
    }

    /// The current ensemble.
    pub fn latest(&self) -> Option<&EnsembleResult> {
        self.entries.last().map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &EnsembleResult)> {
        self.entries.iter().map(|(key, result)| (key, result))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What `EnsembleStore::persist` did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Created(Uuid),
    /// An entry with the same identity was found, nothing was written.
    Exists(Uuid),
}

/// Per domain ensemble logs kept in the cluster's shared map.
#[derive(Clone)]
pub struct EnsembleStore {
    cluster: Arc<dyn Cluster>,
    algorithm: String,
    combiner: Combiner,
}

impl EnsembleStore {
    pub fn new(cluster: Arc<dyn Cluster>, algorithm: &str, combiner: Combiner) -> Self {
        Self {
            cluster,
            algorithm: algorithm.to_string(),
            combiner,
        }
    }

    /// The shared map key of a domain's log, `{algorithm}-{domain}-{combiner}`.
    pub fn key(&self, domain: &str) -> String {
        format!("{}-{domain}-{}", self.algorithm, self.combiner)
    }

    /// Appends a result to its domain's log unless an identical one is there already.
    ///
    /// Must only be called while holding the domain's lock.
    pub async fn persist(&self, result: EnsembleResult) -> Persisted {
        let key = self.key(result.domain());
        let mut log = self.cluster.load_log(&key).await.unwrap_or_default();

        if let Some(existing) = log.find(result.id()) {
            debug!(domain = result.domain(); "ensemble {} already persisted as {existing}", result.id());
            return Persisted::Exists(existing);
        }

        let id = result.id().clone();
        let created = log.append(result);
        self.cluster.save_log(&key, log).await;

        info!(key = key.as_str(); "persisted ensemble {id} as {created}");
        Persisted::Created(created)
    }

    /// The current ensemble of a domain.
    pub async fn latest(&self, domain: &str) -> Option<EnsembleResult> {
        let log = self.cluster.load_log(&self.key(domain)).await?;
        log.latest().cloned()
    }

    /// The whole log of a domain, empty if nothing was persisted.
    pub async fn log(&self, domain: &str) -> EnsembleLog {
        self.cluster
            .load_log(&self.key(domain))
            .await
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::cluster::LocalCluster;

    use super::*;

    fn result(state: &[u8]) -> EnsembleResult {
        EnsembleResult::new("d", "Tally", Combiner::Voting, state.to_vec(), 2)
    }

    #[test]
    fn test_key_layout() {
        let cluster = LocalCluster::new();
        let store = EnsembleStore::new(Arc::new(cluster.join()), "Tally", Combiner::Stacking);
        assert_eq!(store.key("$DEF"), "Tally-$DEF-STACKING");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_persist_is_idempotent() {
        let cluster = LocalCluster::new();
        let store = EnsembleStore::new(Arc::new(cluster.join()), "Tally", Combiner::Voting);

        let Persisted::Created(first) = store.persist(result(b"a")).await else {
            panic!("first persist should create an entry");
        };
        assert_eq!(store.persist(result(b"a")).await, Persisted::Exists(first));
        assert!(matches!(store.persist(result(b"b")).await, Persisted::Created(_)));

        let log = store.log("d").await;
        assert_eq!(log.len(), 2);
        assert_eq!(store.latest("d").await.unwrap().state(), b"b");
    }

    #[test]
    fn test_keys_are_time_ordered() {
        let mut log = EnsembleLog::default();
        let a = log.append(result(b"a"));
        let b = log.append(result(b"b"));

        assert!(a < b);
        assert_eq!(log.find(result(b"b").id()), Some(b));
    }
}
