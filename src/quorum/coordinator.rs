//! Quorum-coordinated writes and reads.
//!
//! A write is acknowledged once `W` nodes hold it (the primary's
//! fsync'd WAL append counts as the first acknowledgment). A read
//! consults `R` responsive nodes and returns the highest version seen.
//! With `W + R > N` every read set intersects every write set, so a
//! read that follows an acknowledged write always observes it.

use std::sync::{Arc, Mutex};

use super::config::ClusterConfig;
use super::errors::{ReadError, WriteError};
use crate::health::PrimaryLease;
use crate::observability::Logger;
use crate::replication::{ReplicationError, ReplicationManager, ReplicationOutcome};
use crate::store::{ClusterNode, NodeId};
use crate::trade::{Side, Trade, TradeId};

/// Coordinates the cluster's write and read quorums.
pub struct QuorumCoordinator {
    config: ClusterConfig,
    nodes: Vec<Arc<ClusterNode>>,
    lease: Arc<Mutex<PrimaryLease>>,
    replication: Arc<ReplicationManager>,
}

impl QuorumCoordinator {
    /// `nodes` must be sorted by ascending id.
    pub fn new(
        config: ClusterConfig,
        nodes: Vec<Arc<ClusterNode>>,
        lease: Arc<Mutex<PrimaryLease>>,
        replication: Arc<ReplicationManager>,
    ) -> Self {
        Self {
            config,
            nodes,
            lease,
            replication,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Current lease snapshot.
    pub fn lease(&self) -> PrimaryLease {
        *self.lease.lock().expect("lease lock poisoned")
    }

    fn node(&self, id: NodeId) -> Option<&Arc<ClusterNode>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Writes a trade through the current primary under the current
    /// epoch.
    pub async fn write(
        &self,
        symbol: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<TradeId, WriteError> {
        let lease = self.lease();
        self.write_as(lease.primary, lease.epoch, symbol, side, price, quantity)
            .await
    }

    /// Writes a trade as a specific node under a specific epoch.
    ///
    /// A node that lost the primary lease (a partitioned old primary
    /// still trying to write) presents a superseded epoch here and is
    /// rejected before any state is touched.
    pub async fn write_as(
        &self,
        primary_id: NodeId,
        epoch: u64,
        symbol: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<TradeId, WriteError> {
        let lease = self.lease();
        if epoch < lease.epoch || primary_id != lease.primary {
            Logger::warn(
                "STALE_WRITE_REJECTED",
                &[
                    ("node", &primary_id.to_string()),
                    ("write_epoch", &epoch.to_string()),
                    ("current_epoch", &lease.epoch.to_string()),
                ],
            );
            return Err(WriteError::StaleEpoch {
                write_epoch: epoch,
                current_epoch: lease.epoch,
            });
        }

        let primary = self
            .node(primary_id)
            .ok_or(WriteError::PrimaryUnavailable(primary_id))?;
        if primary.is_failed() {
            return Err(WriteError::PrimaryUnavailable(primary_id));
        }
        primary.observe_epoch(epoch)?;

        // Version 1: quorum writes always create a fresh trade id
        let trade = Trade::new(symbol, side, price, quantity);

        // Durability first: the fsync'd append is the primary's
        // acknowledgment
        let entry = primary.wal_append(&trade).map_err(|e| {
            if e.is_fatal() {
                Logger::fatal(
                    "WAL_WRITE_FATAL",
                    &[("node", &primary_id.to_string()), ("error", &e.to_string())],
                );
                primary.set_health(crate::store::NodeHealth::Failed);
            }
            e
        })?;
        primary.store().apply(&entry)?;

        let outcome = self
            .replication
            .replicate(primary_id, epoch, entry.clone(), self.config.required_replica_acks())
            .await;

        match outcome {
            Ok(ReplicationOutcome::Committed { replica_acks }) => {
                Logger::info(
                    "WRITE_COMMITTED",
                    &[
                        ("sequence", &entry.sequence.to_string()),
                        ("trade_id", &trade.id.to_string()),
                        ("acks", &(replica_acks + 1).to_string()),
                    ],
                );
                Ok(trade.id)
            }
            // Async mode: durable on the primary, acks arrive later
            Ok(ReplicationOutcome::Pending) => Ok(trade.id),
            Err(ReplicationError::QuorumNotReached { acks, .. }) => {
                Err(WriteError::QuorumNotReached {
                    acks: acks + 1,
                    required: self.config.write_quorum,
                })
            }
            Err(e) => Err(WriteError::Replication(e)),
        }
    }

    /// Reads a trade from `R` responsive nodes, returning the highest
    /// version observed.
    pub fn read(&self, id: &TradeId) -> Result<Trade, ReadError> {
        let required = self.config.read_quorum;
        let responsive: Vec<&Arc<ClusterNode>> =
            self.nodes.iter().filter(|n| !n.is_failed()).collect();

        if responsive.len() < required {
            return Err(ReadError::QuorumNotReached {
                responses: responsive.len(),
                required,
            });
        }

        // Any R distinct nodes intersect the write set; highest version
        // wins across the responses
        responsive
            .iter()
            .take(required)
            .filter_map(|n| n.store().get(id))
            .max_by_key(|t| t.version)
            .ok_or(ReadError::NotFound(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{ReplicationConfig, ReplicationMode};
    use crate::store::{NodeHealth, NodeRole};
    use tempfile::TempDir;
    use uuid::Uuid;

    struct Fixture {
        _dirs: Vec<TempDir>,
        nodes: Vec<Arc<ClusterNode>>,
        coordinator: QuorumCoordinator,
    }

    fn fixture(n: usize, w: usize, r: usize, mode: ReplicationMode) -> Fixture {
        let config = ClusterConfig::new(n, w, r).unwrap();
        let mut dirs = Vec::new();
        let mut nodes = Vec::new();
        for i in 0..n as u32 {
            let dir = TempDir::new().unwrap();
            let role = if i == 0 { NodeRole::Primary } else { NodeRole::Replica };
            let (node, _) = ClusterNode::open(NodeId(i), dir.path(), role).unwrap();
            nodes.push(Arc::new(node));
            dirs.push(dir);
        }
        let lease = Arc::new(Mutex::new(PrimaryLease {
            primary: NodeId(0),
            epoch: config.initial_epoch,
        }));
        let replication = Arc::new(ReplicationManager::new(
            nodes.clone(),
            ReplicationConfig::fast(mode),
        ));
        let coordinator = QuorumCoordinator::new(config, nodes.clone(), lease, replication);
        Fixture {
            _dirs: dirs,
            nodes,
            coordinator,
        }
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);

        let id = f
            .coordinator
            .write("ETH/USD", Side::Buy, 2_800.0, 10.0)
            .await
            .unwrap();

        let trade = f.coordinator.read(&id).unwrap();
        assert_eq!(trade.symbol, "ETH/USD");
        assert_eq!(trade.price, 2_800.0);
        assert_eq!(trade.quantity, 10.0);
        assert_eq!(trade.version, 1);
    }

    #[tokio::test]
    async fn test_write_tolerates_one_failed_replica() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);
        f.nodes[2].set_health(NodeHealth::Failed);

        let id = f
            .coordinator
            .write("BTC/USD", Side::Sell, 42_000.0, 0.5)
            .await
            .unwrap();
        assert_eq!(f.coordinator.read(&id).unwrap().symbol, "BTC/USD");
    }

    #[tokio::test]
    async fn test_write_quorum_not_reached_counts_primary() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);
        f.nodes[1].set_health(NodeHealth::Failed);
        f.nodes[2].set_health(NodeHealth::Failed);

        let err = f
            .coordinator
            .write("BTC/USD", Side::Buy, 42_000.0, 0.5)
            .await
            .unwrap_err();
        // Primary's own ack is the 1
        assert!(matches!(
            err,
            WriteError::QuorumNotReached { acks: 1, required: 2 }
        ));
        // The primary keeps the entry; failed writes are not rolled back
        assert_eq!(f.nodes[0].store().len(), 1);
    }

    #[tokio::test]
    async fn test_read_quorum_not_reached() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);
        f.nodes[1].set_health(NodeHealth::Failed);
        f.nodes[2].set_health(NodeHealth::Failed);

        let err = f.coordinator.read(&Uuid::new_v4()).unwrap_err();
        assert_eq!(
            err,
            ReadError::QuorumNotReached { responses: 1, required: 2 }
        );
    }

    #[tokio::test]
    async fn test_read_unknown_trade_is_not_found() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);
        let id = Uuid::new_v4();
        assert_eq!(f.coordinator.read(&id).unwrap_err(), ReadError::NotFound(id));
    }

    #[tokio::test]
    async fn test_stale_epoch_write_rejected_without_side_effects() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);

        let err = f
            .coordinator
            .write_as(NodeId(0), 0, "BTC/USD", Side::Buy, 42_000.0, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::StaleEpoch { write_epoch: 0, current_epoch: 1 }
        ));
        for node in &f.nodes {
            assert!(node.store().is_empty());
            assert_eq!(node.wal_next_sequence(), 1);
        }
    }

    #[tokio::test]
    async fn test_non_lease_holder_write_rejected() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);

        // Correct epoch, wrong node: still not the lease holder
        let err = f
            .coordinator
            .write_as(NodeId(1), 1, "BTC/USD", Side::Buy, 42_000.0, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::StaleEpoch { .. }));
    }

    #[tokio::test]
    async fn test_failed_primary_is_unavailable() {
        let f = fixture(3, 2, 2, ReplicationMode::Sync);
        f.nodes[0].set_health(NodeHealth::Failed);

        let err = f
            .coordinator
            .write("BTC/USD", Side::Buy, 42_000.0, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::PrimaryUnavailable(NodeId(0))));
    }

    #[tokio::test]
    async fn test_async_write_acknowledges_after_primary_durability() {
        let f = fixture(3, 2, 2, ReplicationMode::Async);

        let id = f
            .coordinator
            .write("SOL/USD", Side::Buy, 150.0, 20.0)
            .await
            .unwrap();

        // Acknowledged from the primary alone
        assert_eq!(f.nodes[0].store().get(&id).unwrap().symbol, "SOL/USD");

        // Replicas converge in the background
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        for node in &f.nodes[1..] {
            assert_eq!(node.store().last_acked_sequence(), 1);
        }
    }
}
