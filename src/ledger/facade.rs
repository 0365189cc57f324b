//! The replicated trade ledger.
//!
//! Wires the cluster together: one WAL-backed node per member, a
//! replication manager fanning out committed entries, a quorum
//! coordinator on the write and read paths, and a health monitor plus
//! failover controller keeping a primary available.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::report::ClusterHealthReport;
use crate::health::{
    FailoverController, HealthConfig, HealthError, HealthMonitor, HealthResult, PrimaryLease,
};
use crate::observability::Logger;
use crate::quorum::{ClusterConfig, QuorumCoordinator, ReadError, WriteError};
use crate::replication::{ReplicationConfig, ReplicationManager};
use crate::store::{ClusterNode, NodeId, NodeRole};
use crate::trade::{Side, Trade, TradeId};
use crate::wal::{LogEntry, WalResult};

/// A replicated, durable ledger of executed trades.
pub struct TradeLedger {
    nodes: Vec<Arc<ClusterNode>>,
    coordinator: QuorumCoordinator,
    replication: Arc<ReplicationManager>,
    monitor: HealthMonitor,
    failover: FailoverController,
}

impl TradeLedger {
    /// Opens (or creates) a cluster rooted at `data_dir`.
    ///
    /// Each node keeps its state under `<data_dir>/node-<id>/`. Node 0
    /// starts as primary. Each node's WAL holds only the slice it wrote
    /// while primary, so the committed history is the sequence-keyed
    /// union of every recovered WAL; every node restarts on that merged
    /// history. Recovery after a crash is a normal open.
    pub fn open(
        data_dir: &Path,
        cluster: ClusterConfig,
        replication_config: ReplicationConfig,
        health_config: HealthConfig,
    ) -> WalResult<Self> {
        let mut nodes = Vec::with_capacity(cluster.node_count);
        let mut recovered_histories = Vec::with_capacity(cluster.node_count);

        for i in 0..cluster.node_count as u32 {
            let id = NodeId(i);
            let role = if i == 0 { NodeRole::Primary } else { NodeRole::Replica };
            let node_dir = data_dir.join(id.to_string());
            let (node, recovered) = ClusterNode::open(id, &node_dir, role)?;
            nodes.push(Arc::new(node));
            recovered_histories.push(recovered);
        }

        let replication = Arc::new(ReplicationManager::new(nodes.clone(), replication_config));

        // After a failover the history is split across WALs: the old
        // primary holds the prefix, each promoted primary its own tail.
        // Union them by sequence before anything is seeded.
        let mut merged: Vec<LogEntry> = recovered_histories.into_iter().flatten().collect();
        merged.sort_by_key(|e| e.sequence);
        merged.dedup_by_key(|e| e.sequence);
        let mut versions: HashMap<TradeId, u64> = HashMap::new();
        for entry in &mut merged {
            let version = versions.entry(entry.trade.id).or_insert(0);
            *version += 1;
            entry.trade.version = *version;
        }
        replication.seed_history(&merged);

        let lease = Arc::new(Mutex::new(PrimaryLease {
            primary: NodeId(0),
            epoch: cluster.initial_epoch,
        }));
        // A node's own WAL may cover only part of the history (or none);
        // every store restarts on the full committed run
        let history = replication.entries_since(0);
        for node in &nodes {
            node.store().replay(&history);
            // Catch the node's WAL tail up too, so its log stays
            // contiguous when it appends again as primary
            node.wal_catch_up(&history)?;
            node.wal_advance_to(replication.last_sequence() + 1);
            // Fresh nodes start at epoch 0; this cannot regress
            let _ = node.observe_epoch(cluster.initial_epoch);
        }

        let coordinator = QuorumCoordinator::new(
            cluster,
            nodes.clone(),
            Arc::clone(&lease),
            Arc::clone(&replication),
        );
        let monitor = HealthMonitor::new(nodes.clone(), health_config);
        let failover =
            FailoverController::new(nodes.clone(), lease, Arc::clone(&replication));

        Logger::info(
            "CLUSTER_OPENED",
            &[
                ("nodes", &cluster.node_count.to_string()),
                ("write_quorum", &cluster.write_quorum.to_string()),
                ("read_quorum", &cluster.read_quorum.to_string()),
                ("recovered_sequence", &replication.last_sequence().to_string()),
            ],
        );

        Ok(Self {
            nodes,
            coordinator,
            replication,
            monitor,
            failover,
        })
    }

    /// Current primary lease.
    pub fn lease(&self) -> PrimaryLease {
        self.failover.lease()
    }

    /// Executes a trade through the quorum write path.
    ///
    /// If the current primary cannot take the write, failover runs once
    /// and the write retries under the new lease. A second failure is
    /// returned to the caller.
    pub async fn execute_trade(
        &self,
        symbol: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<TradeId, WriteError> {
        match self.coordinator.write(symbol, side, price, quantity).await {
            Err(WriteError::PrimaryUnavailable(_)) | Err(WriteError::Wal(_)) => {
                self.failover.failover().map_err(|e| match e {
                    HealthError::NoHealthyNode => WriteError::NoHealthyNode,
                    // A candidate that cannot be promoted leaves the
                    // cluster without a writable primary
                    _ => WriteError::NoHealthyNode,
                })?;
                self.coordinator.write(symbol, side, price, quantity).await
            }
            other => other,
        }
    }

    /// Reads a trade through the quorum read path.
    pub fn get_trade(&self, id: &TradeId) -> Result<Trade, ReadError> {
        self.coordinator.read(id)
    }

    /// Reclassifies node health and reports the cluster state.
    pub fn get_cluster_health(&self) -> ClusterHealthReport {
        let mut states: Vec<_> = self.monitor.check_health().into_values().collect();
        states.sort_by_key(|s| s.node_id);

        let lease = self.failover.lease();
        ClusterHealthReport {
            epoch: lease.epoch,
            primary: lease.primary,
            last_sequence: self.replication.last_sequence(),
            in_flight_replications: self.replication.in_flight(),
            nodes: states,
            generated_at: Utc::now(),
        }
    }

    /// Records a heartbeat from every node that is not Failed.
    pub fn heartbeat_all(&self) {
        self.monitor.heartbeat_all();
    }

    /// Records a heartbeat from one node.
    pub fn heartbeat(&self, id: NodeId) -> HealthResult<()> {
        self.monitor.heartbeat(id)
    }

    /// Marks a node Failed, as if it had stopped heartbeating.
    pub fn simulate_failure(&self, id: NodeId) -> HealthResult<()> {
        self.monitor.mark_failed(id)
    }

    /// Runs failover now instead of waiting for the next failed write.
    pub fn trigger_failover(&self) -> HealthResult<PrimaryLease> {
        self.failover.failover()
    }

    /// Brings a failed node back: resync first, Healthy second.
    pub fn recover_node(&self, id: NodeId) -> HealthResult<()> {
        let node = self
            .nodes
            .iter()
            .find(|n| n.id() == id)
            .ok_or(HealthError::UnknownNode(id))?;

        let missing = self
            .replication
            .entries_since(node.store().last_acked_sequence());
        node.store()
            .resync(&missing)
            .map_err(|e| HealthError::ResyncFailed {
                node: id,
                reason: e.to_string(),
            })?;

        let lease = self.failover.lease();
        node.observe_epoch(lease.epoch)
            .map_err(|e| HealthError::ResyncFailed {
                node: id,
                reason: e.to_string(),
            })?;
        node.wal_catch_up(&self.replication.entries_since(node.wal_next_sequence() - 1))
            .map_err(|e| HealthError::ResyncFailed {
                node: id,
                reason: e.to_string(),
            })?;
        node.wal_advance_to(self.replication.last_sequence() + 1);

        self.monitor.mark_recovered(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::ReplicationMode;
    use crate::store::NodeHealth;
    use tempfile::TempDir;

    fn open_ledger(dir: &Path, n: usize, w: usize, r: usize) -> TradeLedger {
        TradeLedger::open(
            dir,
            ClusterConfig::new(n, w, r).unwrap(),
            ReplicationConfig::fast(ReplicationMode::Sync),
            HealthConfig::fast(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_get_trade() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(dir.path(), 3, 2, 2);

        let id = ledger
            .execute_trade("ETH/USD", Side::Buy, 2_800.0, 10.0)
            .await
            .unwrap();
        let trade = ledger.get_trade(&id).unwrap();
        assert_eq!(trade.symbol, "ETH/USD");
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.price, 2_800.0);
    }

    #[tokio::test]
    async fn test_failed_primary_triggers_failover_and_retry() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(dir.path(), 3, 2, 2);

        ledger.simulate_failure(NodeId(0)).unwrap();
        let id = ledger
            .execute_trade("BTC/USD", Side::Sell, 42_000.0, 0.25)
            .await
            .unwrap();

        let lease = ledger.lease();
        assert_eq!(lease.primary, NodeId(1));
        assert_eq!(lease.epoch, 2);
        assert_eq!(ledger.get_trade(&id).unwrap().symbol, "BTC/USD");
    }

    #[tokio::test]
    async fn test_no_healthy_node_when_all_down() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(dir.path(), 3, 2, 2);
        for i in 0..3 {
            ledger.simulate_failure(NodeId(i)).unwrap();
        }

        let err = ledger
            .execute_trade("BTC/USD", Side::Buy, 42_000.0, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::NoHealthyNode));
    }

    #[tokio::test]
    async fn test_recover_node_resyncs_missed_entries() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(dir.path(), 3, 2, 2);

        ledger.simulate_failure(NodeId(2)).unwrap();
        let id = ledger
            .execute_trade("SOL/USD", Side::Buy, 150.0, 3.0)
            .await
            .unwrap();

        ledger.recover_node(NodeId(2)).unwrap();
        let report = ledger.get_cluster_health();
        assert_eq!(report.nodes[2].health, NodeHealth::Healthy);
        assert_eq!(report.nodes[2].last_acked_sequence, 1);

        // The recovered node serves the trade it missed
        assert_eq!(
            ledger.nodes[2].store().get(&id).unwrap().symbol,
            "SOL/USD"
        );
    }

    #[tokio::test]
    async fn test_health_report_shape() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(dir.path(), 3, 2, 2);
        ledger.heartbeat_all();

        let report = ledger.get_cluster_health();
        assert_eq!(report.epoch, 1);
        assert_eq!(report.primary, NodeId(0));
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.responsive_nodes(), 3);
        // Sorted ascending by node id
        assert_eq!(report.nodes[0].node_id, NodeId(0));
        assert_eq!(report.nodes[2].node_id, NodeId(2));
    }

    #[tokio::test]
    async fn test_reopen_after_failover_merges_split_history() {
        let dir = TempDir::new().unwrap();
        let first = {
            let ledger = open_ledger(dir.path(), 3, 2, 2);
            let first = ledger
                .execute_trade("BTC/USD", Side::Buy, 42_000.0, 0.5)
                .await
                .unwrap();
            ledger.simulate_failure(NodeId(0)).unwrap();
            // The promoted primary's WAL tail outgrows the old prefix
            for _ in 0..4 {
                ledger
                    .execute_trade("ETH/USD", Side::Sell, 2_800.0, 1.0)
                    .await
                    .unwrap();
            }
            assert_eq!(ledger.lease().primary, NodeId(1));
            first
        };

        // A restart is a normal open: node-0 leads again, its store and
        // WAL counter caught up to the merged history
        let ledger = open_ledger(dir.path(), 3, 2, 2);
        assert_eq!(ledger.get_cluster_health().last_sequence, 5);
        assert_eq!(ledger.get_trade(&first).unwrap().price, 42_000.0);

        let id = ledger
            .execute_trade("SOL/USD", Side::Buy, 150.0, 2.0)
            .await
            .unwrap();
        assert_eq!(ledger.get_trade(&id).unwrap().symbol, "SOL/USD");
        assert_eq!(ledger.get_cluster_health().last_sequence, 6);
        drop(ledger);

        // Catch-up kept every WAL contiguous, so a second restart
        // recovers the full run as well
        let ledger = open_ledger(dir.path(), 3, 2, 2);
        assert_eq!(ledger.get_cluster_health().last_sequence, 6);
        assert_eq!(ledger.get_trade(&id).unwrap().symbol, "SOL/USD");
    }

    #[tokio::test]
    async fn test_reopen_recovers_committed_trades() {
        let dir = TempDir::new().unwrap();
        let id = {
            let ledger = open_ledger(dir.path(), 3, 2, 2);
            ledger
                .execute_trade("BTC/USD", Side::Buy, 42_000.0, 0.5)
                .await
                .unwrap()
        };

        let ledger = open_ledger(dir.path(), 3, 2, 2);
        let trade = ledger.get_trade(&id).unwrap();
        assert_eq!(trade.price, 42_000.0);
        assert_eq!(ledger.get_cluster_health().last_sequence, 1);
    }
}
