use crate::{Combiner, EvaluationSet, Result, TrainingBatch};

/// An incremental learning algorithm.
///
/// The coordination core never looks inside a model, it only builds, updates and
/// serializes it through this trait. A `Learner` is shared by every domain of a node,
/// so it must not hold per model state.
pub trait Learner: Send + Sync + 'static {
    /// The trainable model handle.
    type Model: Send + 'static;

    /// The name of the underlying algorithm, used in persistence keys.
    fn algorithm(&self) -> &str;

    /// Derives the model's structural shape from the first batch of a domain.
    ///
    /// The returned model is untrained, the batch is absorbed right after through `update`.
    ///
    /// # Arguments
    /// * `batch` - The first batch observed for the domain.
    ///
    /// # Returns
    /// A new untrained model or an error if the batch is unusable.
    fn build(&self, batch: &TrainingBatch) -> Result<Self::Model>;

    /// Absorbs a batch into an existing model.
    ///
    /// # Arguments
    /// * `model` - The model to update in place.
    /// * `batch` - The batch to learn from.
    fn update(&self, model: &mut Self::Model, batch: &TrainingBatch) -> Result<()>;

    /// Serializes the trained state of `model`.
    ///
    /// Equal models must serialize to equal bytes, the content identity of snapshots
    /// depends on it.
    fn serialize(&self, model: &Self::Model) -> Result<Vec<u8>>;

    /// Rebuilds a model from bytes previously produced by `serialize`.
    fn restore(&self, state: &[u8]) -> Result<Self::Model>;

    /// Combines many serialized models into a single serialized ensemble.
    ///
    /// # Arguments
    /// * `combiner` - The combination strategy.
    /// * `options` - Free form strategy options.
    /// * `states` - The serialized models, duplicates included.
    /// * `evaluation` - The evaluation set, required by `Combiner::Evaluating`.
    ///
    /// # Returns
    /// The serialized ensemble or an error if the models can't be combined.
    fn combine(
        &self,
        combiner: Combiner,
        options: Option<&str>,
        states: &[&[u8]],
        evaluation: Option<&EvaluationSet>,
    ) -> Result<Vec<u8>>;
}
