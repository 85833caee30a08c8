mod cache;
mod config;
mod error;
mod node;

pub use config::NodeConfig;
pub use error::{NodeErr, Result};
pub use node::Node;
