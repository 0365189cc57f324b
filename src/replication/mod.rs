//! Replication of committed entries from the primary to the replica set.
//!
//! The fan-out is concurrent (one task per replica) with per-replica
//! timeouts; entries are applied strictly in sequence order on every
//! replica, with gap-triggered resync from the primary's history.

mod config;
mod errors;
mod manager;

pub use config::{ReplicationConfig, ReplicationMode};
pub use errors::{ReplicationError, ReplicationResult};
pub use manager::{ReplicationManager, ReplicationOutcome};
