use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used by every `Learner` operation.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    /// The batch could not be absorbed by the model.
    InvalidBatch { reason: String },
    /// A serialized model state could not be decoded.
    InvalidState { reason: String },
    /// The batch shape differs from the shape frozen on the first batch.
    ShapeMismatch { expected: usize, got: usize },
    /// The `EVALUATING` combiner was asked to run without an evaluation set.
    EvaluationSetRequired,
    /// A combiner was invoked with no model states.
    EmptyCombineInput,
    /// The learner failed to produce a combined model.
    Combine { reason: String },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::InvalidBatch { reason } => write!(f, "invalid training batch: {reason}"),
            MlErr::InvalidState { reason } => write!(f, "invalid model state: {reason}"),
            MlErr::ShapeMismatch { expected, got } => write!(
                f,
                "batch shape mismatch, the model was built for {expected} fields but got {got}"
            ),
            MlErr::EvaluationSetRequired => {
                f.write_str("an evaluation set is needed for the EVALUATING combiner")
            }
            MlErr::EmptyCombineInput => f.write_str("there are no model states to combine"),
            MlErr::Combine { reason } => write!(f, "failed to combine models: {reason}"),
        }
    }
}

impl Error for MlErr {}
