//! Store error types.

use super::node::NodeId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised when applying entries to a node's store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Entry does not immediately follow the last acknowledged sequence.
    /// The replica must request the missing range from the primary rather
    /// than apply out of order.
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    /// Entry carries an epoch older than one this node has already seen.
    /// Rejected without side effects; this fences demoted primaries.
    #[error("stale epoch: entry epoch {entry_epoch}, node has seen {node_epoch}")]
    StaleEpoch { entry_epoch: u64, node_epoch: u64 },

    /// Node is failed and cannot accept entries.
    #[error("node {0} unavailable")]
    NodeUnavailable(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let gap = StoreError::SequenceGap { expected: 4, got: 7 };
        assert!(gap.to_string().contains("expected 4"));

        let stale = StoreError::StaleEpoch {
            entry_epoch: 1,
            node_epoch: 2,
        };
        assert!(stale.to_string().contains("stale epoch"));
    }
}
