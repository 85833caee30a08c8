pub mod batch;
pub mod combiner;
pub mod error;
pub mod learner;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use batch::{EvaluationSet, TrainingBatch};
pub use combiner::Combiner;
pub use error::{MlErr, Result};
pub use learner::Learner;
