use std::{error::Error, fmt, io};

use coordinator::GatherErr;
use worker::{CheckpointErr, EngineErr};

/// The node module's result type.
pub type Result<T> = std::result::Result<T, NodeErr>;

/// All errors that can occur in a node.
#[derive(Debug)]
pub enum NodeErr {
    /// Invalid configuration, caught before anything starts.
    InvalidConfig(String),
    Engine(EngineErr),
    Gather(GatherErr),
    Checkpoint(CheckpointErr),
    Io(io::Error),
}

impl fmt::Display for NodeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Engine(e) => write!(f, "{e}"),
            Self::Gather(e) => write!(f, "{e}"),
            Self::Checkpoint(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for NodeErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(e) => Some(e),
            Self::Gather(e) => Some(e),
            Self::Checkpoint(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::InvalidConfig(_) => None,
        }
    }
}

impl From<EngineErr> for NodeErr {
    fn from(e: EngineErr) -> Self {
        Self::Engine(e)
    }
}

impl From<GatherErr> for NodeErr {
    fn from(e: GatherErr) -> Self {
        Self::Gather(e)
    }
}

impl From<CheckpointErr> for NodeErr {
    fn from(e: CheckpointErr) -> Self {
        Self::Checkpoint(e)
    }
}

impl From<io::Error> for NodeErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
