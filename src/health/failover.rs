//! Primary failover with epoch fencing.
//!
//! Promotion order is deterministic: the healthy node with the lowest id
//! wins, so every observer agrees on the outcome without an election
//! protocol. Each promotion bumps the epoch; writes carrying an older
//! epoch are fenced out by every node.

use std::sync::{Arc, Mutex};

use super::errors::{HealthError, HealthResult};
use crate::observability::Logger;
use crate::replication::ReplicationManager;
use crate::store::{ClusterNode, NodeHealth, NodeId, NodeRole};

/// Who may write, and under which epoch.
///
/// Shared between the write path (reads it) and the failover controller
/// (rewrites it under the same lock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryLease {
    pub primary: NodeId,
    pub epoch: u64,
}

/// Promotes a replica when the primary fails.
pub struct FailoverController {
    nodes: Vec<Arc<ClusterNode>>,
    lease: Arc<Mutex<PrimaryLease>>,
    replication: Arc<ReplicationManager>,
}

impl FailoverController {
    /// `nodes` must be sorted by ascending id; promotion scans them in
    /// that order.
    pub fn new(
        nodes: Vec<Arc<ClusterNode>>,
        lease: Arc<Mutex<PrimaryLease>>,
        replication: Arc<ReplicationManager>,
    ) -> Self {
        Self {
            nodes,
            lease,
            replication,
        }
    }

    /// Current lease snapshot.
    pub fn lease(&self) -> PrimaryLease {
        *self.lease.lock().expect("lease lock poisoned")
    }

    fn node(&self, id: NodeId) -> Option<&Arc<ClusterNode>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Promotes the first healthy replica (ascending id) to primary.
    ///
    /// No-op if the current primary is still healthy, so concurrent
    /// triggers collapse into one promotion. The promoted node is brought
    /// up to date from the committed history before it takes writes, and
    /// the epoch is bumped so the old primary cannot fence back in.
    pub fn failover(&self) -> HealthResult<PrimaryLease> {
        let mut lease = self.lease.lock().expect("lease lock poisoned");

        let old_primary = lease.primary;
        if let Some(node) = self.node(old_primary) {
            if node.health() == NodeHealth::Healthy {
                return Ok(*lease);
            }
        }

        let candidate = self
            .nodes
            .iter()
            .filter(|n| n.id() != old_primary)
            .find(|n| n.health() == NodeHealth::Healthy)
            .ok_or_else(|| {
                Logger::fatal(
                    "FAILOVER_EXHAUSTED",
                    &[("old_primary", &old_primary.to_string())],
                );
                HealthError::NoHealthyNode
            })?;

        // Close the candidate's replication lag before it takes writes
        let missing = self
            .replication
            .entries_since(candidate.store().last_acked_sequence());
        candidate
            .store()
            .resync(&missing)
            .map_err(|e| HealthError::ResyncFailed {
                node: candidate.id(),
                reason: e.to_string(),
            })?;

        let new_epoch = lease.epoch + 1;
        // The promoted node has seen its own epoch; the old primary's
        // writes now carry a stale one
        candidate
            .observe_epoch(new_epoch)
            .map_err(|e| HealthError::ResyncFailed {
                node: candidate.id(),
                reason: e.to_string(),
            })?;
        candidate.set_role(NodeRole::Primary);
        // Its WAL becomes the durable authority for new writes; append
        // the history it is missing so the log stays contiguous
        candidate
            .wal_catch_up(
                &self
                    .replication
                    .entries_since(candidate.wal_next_sequence() - 1),
            )
            .map_err(|e| HealthError::ResyncFailed {
                node: candidate.id(),
                reason: e.to_string(),
            })?;
        candidate.wal_advance_to(self.replication.last_sequence() + 1);

        if let Some(old) = self.node(old_primary) {
            old.set_role(NodeRole::Replica);
        }

        lease.primary = candidate.id();
        lease.epoch = new_epoch;

        Logger::info(
            "FAILOVER_COMPLETE",
            &[
                ("old_primary", &old_primary.to_string()),
                ("new_primary", &candidate.id().to_string()),
                ("epoch", &new_epoch.to_string()),
            ],
        );
        Ok(*lease)
    }
}
