use std::fmt;

use crate::store::Persisted;

/// How a gather round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineOutcome {
    /// A new ensemble was persisted.
    Created,
    /// An identical ensemble was already persisted, nothing was written.
    Exists,
    /// No round was run, either another one held the lock or none was needed.
    Ignored,
    /// Some member never acknowledged the dump request.
    Timeout,
}

impl fmt::Display for CombineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CombineOutcome::Created => "CREATED",
            CombineOutcome::Exists => "EXISTS",
            CombineOutcome::Ignored => "IGNORED",
            CombineOutcome::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

impl From<Persisted> for CombineOutcome {
    fn from(value: Persisted) -> Self {
        match value {
            Persisted::Created(_) => CombineOutcome::Created,
            Persisted::Exists(_) => CombineOutcome::Exists,
        }
    }
}
