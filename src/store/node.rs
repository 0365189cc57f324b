//! Node identity, role, and health state.
//!
//! A node is either the Primary (creates history) or a Replica (consumes
//! history). At most one node holds the Primary role for a given epoch.
//! Health moves `Healthy -> Degraded -> Failed` on heartbeat age;
//! `Failed -> Healthy` only via explicit recovery after resync.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::{StoreError, StoreResult};
use super::replica::ReplicaStore;
use crate::trade::Trade;
use crate::wal::{self, LogEntry, WalResult, WalWriter};

/// Numeric node identifier. Failover scans nodes in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Cluster role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeRole {
    /// Sole write authority for the current epoch
    Primary,
    /// Follows the primary
    Replica,
}

/// Health classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeHealth {
    Healthy,
    Degraded,
    Failed,
}

/// Point-in-time snapshot of a node, as reported by the health monitor.
#[derive(Debug, Clone, Serialize)]
pub struct NodeState {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub health: NodeHealth,
    pub last_acked_sequence: u64,
    pub last_heartbeat: DateTime<Utc>,
}

/// A single ledger node: its store, its WAL, and its cluster bookkeeping.
///
/// Every node carries a WAL; only the node currently holding the Primary
/// role appends to it. Cross-node interaction goes through replication
/// calls, never shared mutable state.
pub struct ClusterNode {
    id: NodeId,
    store: ReplicaStore,
    wal: Mutex<WalWriter>,
    role: RwLock<NodeRole>,
    health: RwLock<NodeHealth>,
    /// Highest epoch this node has acknowledged. Entries from older
    /// epochs are fenced out.
    epoch_seen: AtomicU64,
    /// (monotonic instant for aging, wall clock for reporting)
    last_heartbeat: Mutex<(Instant, DateTime<Utc>)>,
}

impl ClusterNode {
    /// Opens a node, recovering its store from its WAL.
    ///
    /// Returns the node and the recovered entries so the caller can seed
    /// the cluster's replication history.
    pub fn open(id: NodeId, data_dir: &Path, role: NodeRole) -> WalResult<(Self, Vec<LogEntry>)> {
        let wal = WalWriter::open(data_dir)?;
        let recovered = wal::recover(data_dir)?;

        let store = ReplicaStore::new(id);
        store.replay(&recovered);

        let node = Self {
            id,
            store,
            wal: Mutex::new(wal),
            role: RwLock::new(role),
            health: RwLock::new(NodeHealth::Healthy),
            epoch_seen: AtomicU64::new(0),
            last_heartbeat: Mutex::new((Instant::now(), Utc::now())),
        };
        Ok((node, recovered))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    pub fn role(&self) -> NodeRole {
        *self.role.read().expect("role lock poisoned")
    }

    pub fn set_role(&self, role: NodeRole) {
        *self.role.write().expect("role lock poisoned") = role;
    }

    pub fn health(&self) -> NodeHealth {
        *self.health.read().expect("health lock poisoned")
    }

    pub fn set_health(&self, health: NodeHealth) {
        *self.health.write().expect("health lock poisoned") = health;
    }

    pub fn is_failed(&self) -> bool {
        self.health() == NodeHealth::Failed
    }

    /// Records a heartbeat now.
    pub fn heartbeat(&self) {
        let mut hb = self.last_heartbeat.lock().expect("heartbeat lock poisoned");
        *hb = (Instant::now(), Utc::now());
    }

    /// Age of the most recent heartbeat.
    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
            .0
            .elapsed()
    }

    /// Highest epoch this node has acknowledged.
    pub fn epoch_seen(&self) -> u64 {
        self.epoch_seen.load(Ordering::SeqCst)
    }

    /// Records an observed epoch, rejecting regressions.
    pub fn observe_epoch(&self, epoch: u64) -> StoreResult<()> {
        let seen = self.epoch_seen.fetch_max(epoch, Ordering::SeqCst);
        if epoch < seen {
            return Err(StoreError::StaleEpoch {
                entry_epoch: epoch,
                node_epoch: seen,
            });
        }
        Ok(())
    }

    /// Applies a replicated entry tagged with the sender's epoch.
    ///
    /// Failed nodes reject everything; stale epochs are fenced before the
    /// store is touched, so a rejected entry has no side effects.
    pub fn apply_replicated(&self, epoch: u64, entry: &LogEntry) -> StoreResult<()> {
        if self.is_failed() {
            return Err(StoreError::NodeUnavailable(self.id));
        }
        self.observe_epoch(epoch)?;
        self.store.apply(entry)
    }

    /// Appends a trade to this node's WAL (primary write path).
    pub fn wal_append(&self, trade: &Trade) -> WalResult<LogEntry> {
        self.wal.lock().expect("wal lock poisoned").append(trade)
    }

    /// Appends missing committed history entries to this node's WAL so
    /// the log stays contiguous once new appends continue past it.
    pub fn wal_catch_up(&self, entries: &[LogEntry]) -> WalResult<()> {
        self.wal.lock().expect("wal lock poisoned").catch_up(entries)
    }

    /// Fast-forwards this node's WAL sequence counter after promotion.
    pub fn wal_advance_to(&self, next_sequence: u64) {
        self.wal
            .lock()
            .expect("wal lock poisoned")
            .advance_to(next_sequence);
    }

    /// Next sequence this node's WAL would assign.
    pub fn wal_next_sequence(&self) -> u64 {
        self.wal
            .lock()
            .expect("wal lock poisoned")
            .next_sequence_number()
    }

    /// Point-in-time state snapshot for health reporting.
    pub fn state(&self) -> NodeState {
        NodeState {
            node_id: self.id,
            role: self.role(),
            health: self.health(),
            last_acked_sequence: self.store.last_acked_sequence(),
            last_heartbeat: self
                .last_heartbeat
                .lock()
                .expect("heartbeat lock poisoned")
                .1,
        }
    }
}
