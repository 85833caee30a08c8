use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A domain tagged unit of training data.
///
/// The payload is opaque to the coordination core, only the `Learner` knows how to read it.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    domain: String,
    payload: Bytes,
    enqueued_at: DateTime<Utc>,
}

impl TrainingBatch {
    /// Creates a new `TrainingBatch` stamped with the current time.
    ///
    /// # Arguments
    /// * `domain` - The domain this batch belongs to.
    /// * `payload` - The raw training data.
    ///
    /// # Returns
    /// A new `TrainingBatch` instance.
    pub fn new(domain: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            domain: domain.into(),
            payload: payload.into(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// Rewrites the domain of this batch, used when the caller left it empty
    /// and it had to be resolved to the default domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }
}

/// Opaque labeled data used by the `EVALUATING` combiner to rank models.
#[derive(Debug, Clone)]
pub struct EvaluationSet {
    payload: Bytes,
}

impl EvaluationSet {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}
