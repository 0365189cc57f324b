//! Cluster health reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{NodeId, NodeState};

/// Point-in-time view of the whole cluster, serializable for operators.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealthReport {
    /// Current fencing epoch.
    pub epoch: u64,
    /// Node currently holding the primary lease.
    pub primary: NodeId,
    /// Highest committed sequence in the cluster history.
    pub last_sequence: u64,
    /// Replication dispatches still outstanding.
    pub in_flight_replications: usize,
    /// Per-node snapshots, ascending node id.
    pub nodes: Vec<NodeState>,
    pub generated_at: DateTime<Utc>,
}

impl ClusterHealthReport {
    /// Nodes currently able to serve reads.
    pub fn responsive_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|s| s.health != crate::store::NodeHealth::Failed)
            .count()
    }
}
