//! Quorum configuration, write-path, and read-path error types.

use crate::replication::ReplicationError;
use crate::store::{NodeId, StoreError};
use crate::trade::TradeId;
use crate::wal::WalError;
use thiserror::Error;

/// Rejected cluster configurations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The quorum sizes do not guarantee read-after-write intersection.
    #[error(
        "invalid quorum: W={write_quorum}, R={read_quorum}, N={node_count} \
         (requires 1 <= W,R <= N and W + R > N)"
    )]
    InvalidQuorum {
        node_count: usize,
        write_quorum: usize,
        read_quorum: usize,
    },
}

/// Errors surfaced by the quorum write path.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Fewer than `W` total acknowledgments (primary included) arrived.
    /// The entry may be partially replicated; it is never rolled back.
    #[error("write quorum not reached: {acks} of {required} acknowledgments")]
    QuorumNotReached { acks: usize, required: usize },

    /// The write carried an epoch older than the cluster's current one.
    /// Rejected before any state is touched.
    #[error("stale write: epoch {write_epoch} superseded by {current_epoch}")]
    StaleEpoch { write_epoch: u64, current_epoch: u64 },

    /// The addressed primary is failed or unknown.
    #[error("primary {0} unavailable")]
    PrimaryUnavailable(NodeId),

    /// No healthy candidate was available for promotion.
    #[error("no healthy node available to take writes")]
    NoHealthyNode,

    /// Durability failed on the primary's WAL; nothing was replicated.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// The primary's own store rejected the entry.
    #[error("primary rejected entry: {0}")]
    Rejected(#[from] StoreError),

    /// Replication failed for a reason other than an ack shortfall.
    #[error(transparent)]
    Replication(#[from] ReplicationError),
}

/// Errors surfaced by the quorum read path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    /// Fewer than `R` nodes were responsive.
    #[error("read quorum not reached: {responses} of {required} responses")]
    QuorumNotReached { responses: usize, required: usize },

    /// No responsive node holds the trade.
    #[error("trade {0} not found")]
    NotFound(TradeId),
}
