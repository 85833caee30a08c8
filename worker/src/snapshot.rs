use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The content derived identity of a serialized model.
///
/// Both components are compared together, neither is meant to identify a model on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId {
    hash: u64,
    digest: String,
}

impl ContentId {
    /// Computes the identity of a serialized model.
    ///
    /// # Arguments
    /// * `algorithm` - The name of the algorithm that produced `state`.
    /// * `state` - The serialized model.
    ///
    /// # Returns
    /// The identity, equal inputs always produce equal identities.
    pub fn of(algorithm: &str, state: &[u8]) -> Self {
        let sha = Sha256::digest(state);
        let mut head = [0; 8];
        head.copy_from_slice(&sha[..8]);
        let hash = u64::from_be_bytes(head);

        let mut md5 = Md5::new();
        md5.update(algorithm.as_bytes());
        md5.update(hash.to_be_bytes());
        let digest = hex::encode(md5.finalize());

        Self { hash, digest }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{}", self.hash, self.digest)
    }
}

/// An immutable capture of a node's local model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    domain: String,
    algorithm: String,
    state: Bytes,
    initialized: bool,
    created_at: DateTime<Utc>,
    built_at: Option<DateTime<Utc>>,
    id: ContentId,
}

impl ModelSnapshot {
    /// Captures a trained model.
    pub(crate) fn new(
        domain: &str,
        algorithm: &str,
        state: Vec<u8>,
        built_at: Option<DateTime<Utc>>,
    ) -> Self {
        let id = ContentId::of(algorithm, &state);

        Self {
            domain: domain.to_string(),
            algorithm: algorithm.to_string(),
            state: Bytes::from(state),
            initialized: true,
            created_at: Utc::now(),
            built_at,
            id,
        }
    }

    /// Captures a model that never absorbed a batch.
    pub(crate) fn uninitialized(domain: &str, algorithm: &str) -> Self {
        Self {
            domain: domain.to_string(),
            algorithm: algorithm.to_string(),
            state: Bytes::new(),
            initialized: false,
            created_at: Utc::now(),
            built_at: None,
            id: ContentId::of(algorithm, &[]),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn state(&self) -> &[u8] {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the last batch was absorbed before this capture.
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn id(&self) -> &ContentId {
        &self.id
    }
}
