mod cluster;
mod config;
mod error;
mod gather;
mod outcome;
mod result;
mod rounds;
mod store;

pub use cluster::{Cluster, ClusterLock, LocalCluster, LocalMember};
pub use config::GatherConfig;
pub use error::{GatherErr, Result};
pub use gather::Coordinator;
pub use outcome::CombineOutcome;
pub use result::EnsembleResult;
pub use rounds::{PendingRounds, RoundTicket};
pub use store::{EnsembleLog, EnsembleStore, Persisted};
