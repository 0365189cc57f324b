//! Failover and epoch fencing.
//!
//! When the primary fails, the lowest-id healthy replica is promoted
//! under a bumped epoch. The old primary's writes carry the superseded
//! epoch and are fenced out everywhere, so a partitioned ex-primary can
//! never split the brain.

use std::sync::{Arc, Mutex};

use ledgerdb::health::{FailoverController, HealthConfig, PrimaryLease};
use ledgerdb::quorum::{ClusterConfig, QuorumCoordinator, WriteError};
use ledgerdb::replication::{ReplicationConfig, ReplicationManager, ReplicationMode};
use ledgerdb::store::{ClusterNode, NodeHealth, NodeId, NodeRole};
use ledgerdb::trade::Side;
use ledgerdb::TradeLedger;
use tempfile::TempDir;

fn open_ledger(dir: &std::path::Path, n: usize) -> TradeLedger {
    TradeLedger::open(
        dir,
        ClusterConfig::new(n, 2, 2).unwrap(),
        ReplicationConfig::fast(ReplicationMode::Sync),
        HealthConfig::fast(),
    )
    .unwrap()
}

#[tokio::test]
async fn writes_continue_across_primary_failure() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(dir.path(), 3);

    let before = ledger
        .execute_trade("BTC/USD", Side::Buy, 42_000.0, 0.5)
        .await
        .unwrap();

    ledger.simulate_failure(NodeId(0)).unwrap();

    // This write finds the primary down, promotes node-1, and retries
    let after = ledger
        .execute_trade("ETH/USD", Side::Sell, 2_800.0, 2.0)
        .await
        .unwrap();

    let lease = ledger.lease();
    assert_eq!(lease.primary, NodeId(1));
    assert_eq!(lease.epoch, 2);

    // Both writes readable through the new regime
    assert_eq!(ledger.get_trade(&before).unwrap().symbol, "BTC/USD");
    assert_eq!(ledger.get_trade(&after).unwrap().symbol, "ETH/USD");
}

#[tokio::test]
async fn each_failover_bumps_the_epoch() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(dir.path(), 3);

    ledger.simulate_failure(NodeId(0)).unwrap();
    let lease = ledger.trigger_failover().unwrap();
    assert_eq!((lease.primary, lease.epoch), (NodeId(1), 2));

    ledger.simulate_failure(NodeId(1)).unwrap();
    let lease = ledger.trigger_failover().unwrap();
    assert_eq!((lease.primary, lease.epoch), (NodeId(2), 3));
}

#[tokio::test]
async fn recovered_old_primary_rejoins_as_replica() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(dir.path(), 3);

    ledger.simulate_failure(NodeId(0)).unwrap();
    let missed = ledger
        .execute_trade("SOL/USD", Side::Buy, 150.0, 3.0)
        .await
        .unwrap();

    ledger.recover_node(NodeId(0)).unwrap();

    ledger.heartbeat_all();
    let report = ledger.get_cluster_health();
    assert_eq!(report.primary, NodeId(1));
    assert_eq!(report.nodes[0].role, NodeRole::Replica);
    assert_eq!(report.nodes[0].health, NodeHealth::Healthy);
    // Resync happened before the node was declared healthy
    assert_eq!(report.nodes[0].last_acked_sequence, 1);

    // The rejoined replica participates in new writes
    let id = ledger
        .execute_trade("BTC/USD", Side::Buy, 43_000.0, 0.1)
        .await
        .unwrap();
    assert_eq!(ledger.get_trade(&id).unwrap().price, 43_000.0);
    assert_eq!(ledger.get_trade(&missed).unwrap().symbol, "SOL/USD");
}

#[tokio::test]
async fn cluster_reopens_cleanly_after_failover() {
    let dir = TempDir::new().unwrap();
    let first = {
        let ledger = open_ledger(dir.path(), 3);
        let first = ledger
            .execute_trade("BTC/USD", Side::Buy, 42_000.0, 0.5)
            .await
            .unwrap();
        ledger.simulate_failure(NodeId(0)).unwrap();
        // After failover the history is split: node-0's WAL holds
        // sequence 1, node-1's WAL the longer tail
        for _ in 0..4 {
            ledger
                .execute_trade("ETH/USD", Side::Sell, 2_800.0, 1.0)
                .await
                .unwrap();
        }
        assert_eq!(ledger.lease().primary, NodeId(1));
        first
    };

    let ledger = open_ledger(dir.path(), 3);
    assert_eq!(ledger.get_cluster_health().last_sequence, 5);
    assert_eq!(ledger.get_trade(&first).unwrap().price, 42_000.0);

    // The restored primary accepts writes on the merged history
    let id = ledger
        .execute_trade("SOL/USD", Side::Buy, 150.0, 2.0)
        .await
        .unwrap();
    assert_eq!(ledger.get_trade(&id).unwrap().symbol, "SOL/USD");
    assert_eq!(ledger.get_cluster_health().last_sequence, 6);
    drop(ledger);

    // Every WAL was caught up on open, so a further restart still
    // recovers the whole run
    let ledger = open_ledger(dir.path(), 3);
    assert_eq!(ledger.get_cluster_health().last_sequence, 6);
    assert_eq!(ledger.get_trade(&first).unwrap().price, 42_000.0);
}

/// Split-brain scenario built from the layers directly: the old primary
/// keeps trying to write with its pre-failover lease.
#[tokio::test]
async fn stale_primary_is_fenced_out() {
    let config = ClusterConfig::new(3, 2, 2).unwrap();
    let mut dirs = Vec::new();
    let mut nodes = Vec::new();
    for i in 0..3u32 {
        let dir = TempDir::new().unwrap();
        let role = if i == 0 { NodeRole::Primary } else { NodeRole::Replica };
        let (node, _) = ClusterNode::open(NodeId(i), dir.path(), role).unwrap();
        nodes.push(Arc::new(node));
        dirs.push(dir);
    }
    let lease = Arc::new(Mutex::new(PrimaryLease {
        primary: NodeId(0),
        epoch: 1,
    }));
    let replication = Arc::new(ReplicationManager::new(
        nodes.clone(),
        ReplicationConfig::fast(ReplicationMode::Sync),
    ));
    let coordinator = QuorumCoordinator::new(
        config,
        nodes.clone(),
        Arc::clone(&lease),
        Arc::clone(&replication),
    );
    let controller = FailoverController::new(nodes.clone(), lease, replication);

    // Normal write under epoch 1; let the slower replica finish too
    coordinator
        .write_as(NodeId(0), 1, "BTC/USD", Side::Buy, 42_000.0, 0.5)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // The primary drops off the network and node-1 takes over
    nodes[0].set_health(NodeHealth::Failed);
    let lease = controller.failover().unwrap();
    assert_eq!((lease.primary, lease.epoch), (NodeId(1), 2));

    // The partition heals; the ex-primary believes it still leads
    nodes[0].set_health(NodeHealth::Healthy);
    let sequences_before: Vec<u64> = nodes.iter().map(|n| n.wal_next_sequence()).collect();

    let err = coordinator
        .write_as(NodeId(0), 1, "ETH/USD", Side::Sell, 2_800.0, 1.0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WriteError::StaleEpoch { write_epoch: 1, current_epoch: 2 }
    ));

    // Fenced before any side effects: no WAL append, no store change
    let sequences_after: Vec<u64> = nodes.iter().map(|n| n.wal_next_sequence()).collect();
    assert_eq!(sequences_before, sequences_after);
    for node in &nodes {
        assert_eq!(node.store().len(), 1);
    }

    // The legitimate primary writes under epoch 2
    let id = coordinator
        .write_as(NodeId(1), 2, "ETH/USD", Side::Sell, 2_800.0, 1.0)
        .await
        .unwrap();
    assert_eq!(coordinator.read(&id).unwrap().symbol, "ETH/USD");
}
