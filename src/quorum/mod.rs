//! Quorum-based consistency for cluster writes and reads.

mod config;
mod coordinator;
mod errors;

pub use config::ClusterConfig;
pub use coordinator::QuorumCoordinator;
pub use errors::{ConfigError, ReadError, WriteError};
