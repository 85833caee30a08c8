//! A deterministic label counting learner for exercising the coordination core.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{Combiner, EvaluationSet, Learner, MlErr, Result, TrainingBatch};

/// The model of a `TallyLearner`, how many times each label was seen.
///
/// Payloads are UTF-8 lines of tab separated fields, the first field is the label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub fields: usize,
    pub batches: u64,
    pub labels: BTreeMap<String, u64>,
}

impl Tally {
    /// Decodes a state produced by `TallyLearner::serialize`.
    pub fn from_state(state: &[u8]) -> Result<Self> {
        serde_json::from_slice(state).map_err(|e| MlErr::InvalidState {
            reason: e.to_string(),
        })
    }

    /// The sum of every label count.
    pub fn observations(&self) -> u64 {
        self.labels.values().sum()
    }

    fn merge(&mut self, other: &Tally) {
        self.batches += other.batches;
        for (label, count) in &other.labels {
            *self.labels.entry(label.clone()).or_default() += count;
        }
    }
}

/// Counts labels and records how it was driven by the core.
#[derive(Debug, Default)]
pub struct TallyLearner {
    delay: Duration,
    combines: AtomicUsize,
    last_inputs: AtomicUsize,
}

impl TallyLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `TallyLearner` that sleeps `delay` in the middle of every update,
    /// between counting the batch and counting its label.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// The amount of times `combine` was called.
    pub fn combines(&self) -> usize {
        self.combines.load(Ordering::Acquire)
    }

    /// The amount of states given to the last `combine` call.
    pub fn last_inputs(&self) -> usize {
        self.last_inputs.load(Ordering::Acquire)
    }

    fn parse(batch: &TrainingBatch) -> Result<(String, usize)> {
        let line = std::str::from_utf8(batch.payload()).map_err(|e| MlErr::InvalidBatch {
            reason: e.to_string(),
        })?;

        let mut fields = line.trim_end().split('\t');
        let label = match fields.next() {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => {
                return Err(MlErr::InvalidBatch {
                    reason: "missing label".into(),
                });
            }
        };

        Ok((label, 1 + fields.count()))
    }
}

impl Learner for TallyLearner {
    type Model = Tally;

    fn algorithm(&self) -> &str {
        "Tally"
    }

    fn build(&self, batch: &TrainingBatch) -> Result<Tally> {
        let (_, fields) = Self::parse(batch)?;
        Ok(Tally {
            fields,
            ..Tally::default()
        })
    }

    fn update(&self, model: &mut Tally, batch: &TrainingBatch) -> Result<()> {
        let (label, fields) = Self::parse(batch)?;
        if fields != model.fields {
            return Err(MlErr::ShapeMismatch {
                expected: model.fields,
                got: fields,
            });
        }

        model.batches += 1;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        *model.labels.entry(label).or_default() += 1;
        Ok(())
    }

    fn serialize(&self, model: &Tally) -> Result<Vec<u8>> {
        serde_json::to_vec(model).map_err(|e| MlErr::InvalidState {
            reason: e.to_string(),
        })
    }

    fn restore(&self, state: &[u8]) -> Result<Tally> {
        Tally::from_state(state)
    }

    fn combine(
        &self,
        combiner: Combiner,
        _options: Option<&str>,
        states: &[&[u8]],
        evaluation: Option<&EvaluationSet>,
    ) -> Result<Vec<u8>> {
        self.combines.fetch_add(1, Ordering::AcqRel);
        self.last_inputs.store(states.len(), Ordering::Release);

        let tallies = states
            .iter()
            .map(|state| Tally::from_state(state))
            .collect::<Result<Vec<_>>>()?;

        let Some(first) = tallies.first() else {
            return Err(MlErr::EmptyCombineInput);
        };

        let combined = match combiner {
            Combiner::Voting | Combiner::Stacking => {
                let mut combined = Tally {
                    fields: first.fields,
                    ..Tally::default()
                };
                tallies.iter().for_each(|tally| combined.merge(tally));
                combined
            }
            Combiner::Evaluating => {
                let evaluation = evaluation.ok_or(MlErr::EvaluationSetRequired)?;
                let label = String::from_utf8_lossy(evaluation.payload()).into_owned();

                // Ties go to the smallest serialized state so the input order doesn't matter.
                tallies
                    .iter()
                    .zip(states)
                    .max_by(|(a, sa), (b, sb)| {
                        let score = |t: &Tally| t.labels.get(&label).copied().unwrap_or_default();
                        score(a).cmp(&score(b)).then_with(|| sb.cmp(sa))
                    })
                    .map(|(tally, _)| tally.clone())
                    .unwrap_or_default()
            }
        };

        self.serialize(&combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(learner: &TallyLearner, labels: &[&str]) -> Vec<u8> {
        let first = TrainingBatch::new("d", labels[0].to_string());
        let mut model = learner.build(&first).unwrap();
        for label in labels {
            learner
                .update(&mut model, &TrainingBatch::new("d", label.to_string()))
                .unwrap();
        }
        learner.serialize(&model).unwrap()
    }

    #[test]
    fn test_shape_is_frozen_by_first_batch() {
        let learner = TallyLearner::new();
        let mut model = learner.build(&TrainingBatch::new("d", "pos\tgood")).unwrap();

        let err = learner
            .update(&mut model, &TrainingBatch::new("d", "neg"))
            .unwrap_err();
        assert!(matches!(err, MlErr::ShapeMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn test_voting_counts_duplicates() {
        let learner = TallyLearner::new();
        let a = state(&learner, &["pos", "neg"]);

        let combined = learner
            .combine(Combiner::Voting, None, &[&a, &a], None)
            .unwrap();
        let tally = Tally::from_state(&combined).unwrap();

        assert_eq!(tally.labels["pos"], 2);
        assert_eq!(tally.batches, 4);
        assert_eq!(learner.combines(), 1);
        assert_eq!(learner.last_inputs(), 2);
    }

    #[test]
    fn test_evaluating_needs_evaluation_set() {
        let learner = TallyLearner::new();
        let a = state(&learner, &["pos"]);

        let err = learner
            .combine(Combiner::Evaluating, None, &[&a], None)
            .unwrap_err();
        assert!(matches!(err, MlErr::EvaluationSetRequired));
    }

    #[test]
    fn test_evaluating_is_order_invariant() {
        let learner = TallyLearner::new();
        let a = state(&learner, &["pos", "neg"]);
        let b = state(&learner, &["neg", "pos"]);
        let eval = EvaluationSet::new("pos");

        let ab = learner
            .combine(Combiner::Evaluating, None, &[&a, &b], Some(&eval))
            .unwrap();
        let ba = learner
            .combine(Combiner::Evaluating, None, &[&b, &a], Some(&eval))
            .unwrap();
        assert_eq!(ab, ba);
    }
}
