use bytes::Bytes;
use chrono::{DateTime, Utc};
use machine_learning::Combiner;
use serde::{Deserialize, Serialize};
use worker::ContentId;

/// A combined model produced by a gather round.
///
/// The status of the round that returned it isn't stored here, `Coordinator::combine`
/// and `Coordinator::retrieve_model` hand it out next to the result as a
/// `CombineOutcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    domain: String,
    algorithm: String,
    combiner: Combiner,
    state: Bytes,
    inputs: usize,
    created_at: DateTime<Utc>,
    id: ContentId,
}

impl EnsembleResult {
    /// Wraps the output of a combiner.
    ///
    /// # Arguments
    /// * `domain` - The domain of the round.
    /// * `algorithm` - The algorithm of the combined models.
    /// * `combiner` - The strategy that produced `state`.
    /// * `state` - The serialized ensemble.
    /// * `inputs` - How many snapshots were combined.
    pub(crate) fn new(
        domain: &str,
        algorithm: &str,
        combiner: Combiner,
        state: Vec<u8>,
        inputs: usize,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            algorithm: algorithm.to_string(),
            combiner,
            id: ContentId::of(algorithm, &state),
            state: Bytes::from(state),
            inputs,
            created_at: Utc::now(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn combiner(&self) -> Combiner {
        self.combiner
    }

    pub fn state(&self) -> &[u8] {
        &self.state
    }

    /// How many snapshots went into this ensemble, duplicates included.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn id(&self) -> &ContentId {
        &self.id
    }
}
