use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::MlErr;

/// The strategy used to turn many trained models into a single ensemble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Combiner {
    /// Majority vote amongst all the models.
    #[default]
    Voting,
    /// A meta model stacked on top of all the models.
    Stacking,
    /// The single best model according to an evaluation set.
    Evaluating,
}

impl Combiner {
    /// Returns the name used in persistence keys and logs.
    pub fn name(self) -> &'static str {
        match self {
            Combiner::Voting => "VOTING",
            Combiner::Stacking => "STACKING",
            Combiner::Evaluating => "EVALUATING",
        }
    }

    /// Whether this combiner needs an `EvaluationSet` to run.
    pub fn requires_evaluation(self) -> bool {
        matches!(self, Combiner::Evaluating)
    }
}

impl fmt::Display for Combiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Combiner {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VOTING" => Ok(Combiner::Voting),
            "STACKING" => Ok(Combiner::Stacking),
            "EVALUATING" => Ok(Combiner::Evaluating),
            other => Err(MlErr::Combine {
                reason: format!("unknown combiner {other}"),
            }),
        }
    }
}
