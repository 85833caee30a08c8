use std::{error::Error, fmt, io};

use machine_learning::MlErr;
use worker::EngineErr;

/// The coordinator module's result type.
pub type Result<T> = std::result::Result<T, GatherErr>;

/// Gather round failures, scoped to a single domain.
#[derive(Debug)]
pub enum GatherErr {
    UnknownDomain(String),
    /// Nobody deposited a snapshot.
    EmptySnapshotSet { domain: String },
    /// Every deposited snapshot was uninitialized.
    NoInitializedModels { domain: String },
    /// Nothing was ever persisted for the domain.
    NotFound { domain: String },
    Combine(MlErr),
    Engine(EngineErr),
    Io(io::Error),
}

impl fmt::Display for GatherErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatherErr::UnknownDomain(domain) => write!(f, "invalid domain specified: {domain}"),
            GatherErr::EmptySnapshotSet { domain } => {
                write!(f, "{domain}| no snapshot was gathered")
            }
            GatherErr::NoInitializedModels { domain } => {
                write!(f, "{domain}| no member has absorbed a batch yet")
            }
            GatherErr::NotFound { domain } => write!(f, "{domain}| no ensemble persisted"),
            GatherErr::Combine(e) => write!(f, "combine failed: {e}"),
            GatherErr::Engine(e) => write!(f, "engine error: {e}"),
            GatherErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for GatherErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GatherErr::Combine(e) => Some(e),
            GatherErr::Engine(e) => Some(e),
            GatherErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineErr> for GatherErr {
    fn from(value: EngineErr) -> Self {
        match value {
            EngineErr::UnknownDomain(domain) => Self::UnknownDomain(domain),
            other => Self::Engine(other),
        }
    }
}

impl From<MlErr> for GatherErr {
    fn from(value: MlErr) -> Self {
        Self::Combine(value)
    }
}

impl From<io::Error> for GatherErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
