pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod registry;
pub mod snapshot;

pub use checkpoint::Checkpoint;
pub use config::{CheckpointConfig, EngineConfig};
pub use engine::BuildEngine;
pub use error::{CheckpointErr, EngineErr, Result};
pub use gate::{BuildGate, GatePhase};
pub use registry::{DEFAULT_DOMAIN, EngineRegistry, resolve_domain};
pub use snapshot::{ContentId, ModelSnapshot};
