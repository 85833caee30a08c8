use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::{MlErr, TrainingBatch};

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Build engine failures.
#[derive(Debug)]
pub enum EngineErr {
    /// The queue stayed full for the whole offer timeout, the batch is handed back.
    QueueFull(Box<TrainingBatch>),
    /// The build consumer couldn't be paused within the configured retries.
    FlushUnavailable { domain: String, retries: usize },
    /// The engine no longer accepts batches.
    ShutDown { domain: String },
    /// No engine is registered for the domain.
    UnknownDomain(String),
    /// The consumer thread panicked before it could be joined.
    ConsumerPanicked { domain: String },
    Learner(MlErr),
    Io(io::Error),
}

impl EngineErr {
    /// Takes back the batch of a `QueueFull` error.
    pub fn into_batch(self) -> Option<TrainingBatch> {
        match self {
            EngineErr::QueueFull(batch) => Some(*batch),
            _ => None,
        }
    }
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErr::QueueFull(batch) => {
                write!(f, "{}| build queue is full", batch.domain())
            }
            EngineErr::FlushUnavailable { domain, retries } => write!(
                f,
                "{domain}| unable to pause the build consumer after {retries} retries"
            ),
            EngineErr::ShutDown { domain } => write!(f, "{domain}| build engine is shut down"),
            EngineErr::UnknownDomain(domain) => write!(f, "invalid domain specified: {domain}"),
            EngineErr::ConsumerPanicked { domain } => {
                write!(f, "{domain}| build consumer panicked")
            }
            EngineErr::Learner(e) => write!(f, "learner error: {e}"),
            EngineErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineErr::Learner(e) => Some(e),
            EngineErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for EngineErr {
    fn from(value: MlErr) -> Self {
        Self::Learner(value)
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Local model cache failures.
#[derive(Debug)]
pub enum CheckpointErr {
    /// Another process holds the cache directory.
    Locked { path: PathBuf },
    /// The cached file exists but can't be decoded.
    Corrupted { path: PathBuf, reason: String },
    Io(io::Error),
}

impl fmt::Display for CheckpointErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointErr::Locked { path } => write!(
                f,
                "cache path already in use by another process, delete {} if no other process is running",
                path.display()
            ),
            CheckpointErr::Corrupted { path, reason } => {
                write!(f, "corrupted cached model at {}: {reason}", path.display())
            }
            CheckpointErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for CheckpointErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CheckpointErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CheckpointErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
