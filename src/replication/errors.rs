//! Replication error types.

use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors surfaced by the replication layer.
///
/// Per-replica failures (timeouts, unavailability, rejections) are
/// absorbed into health-state changes; only a cluster-wide ack shortfall
/// propagates to the write path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplicationError {
    /// Fewer than the required replica acknowledgments arrived before the
    /// timeout. The entry remains partially replicated; callers may retry.
    #[error("replication quorum not reached: {acks} of {required} replica acks")]
    QuorumNotReached { acks: usize, required: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_not_reached_message() {
        let err = ReplicationError::QuorumNotReached { acks: 1, required: 2 };
        assert_eq!(
            err.to_string(),
            "replication quorum not reached: 1 of 2 replica acks"
        );
    }
}
