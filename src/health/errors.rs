//! Health and failover error types.

use crate::store::NodeId;
use thiserror::Error;

/// Result type for health and failover operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Errors surfaced by the health monitor and failover controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HealthError {
    /// Failover found no healthy candidate. The cluster cannot accept
    /// writes until an operator recovers a node.
    #[error("no healthy node available for promotion")]
    NoHealthyNode,

    /// The named node is not a member of this cluster.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Bringing a node up to date failed; it stays Failed.
    #[error("resync of {node} failed: {reason}")]
    ResyncFailed { node: NodeId, reason: String },
}
