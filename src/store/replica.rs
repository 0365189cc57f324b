//! Per-node in-memory store of committed trades.
//!
//! Each node owns exactly one `ReplicaStore`. Readers are concurrent,
//! writes take the single write lock. Entries are applied strictly in
//! sequence order; a gap is rejected so the caller can resync, never
//! silently skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::errors::{StoreError, StoreResult};
use super::node::NodeId;
use crate::trade::{Trade, TradeId};
use crate::wal::LogEntry;

/// In-memory map of committed trades plus replication bookkeeping.
pub struct ReplicaStore {
    node_id: NodeId,
    trades: RwLock<HashMap<TradeId, Trade>>,
    /// Highest sequence this store has applied.
    last_acked: AtomicU64,
}

impl ReplicaStore {
    /// Create an empty store for a node.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            trades: RwLock::new(HashMap::new()),
            last_acked: AtomicU64::new(0),
        }
    }

    /// Returns the owning node id.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Highest sequence number this store has applied.
    pub fn last_acked_sequence(&self) -> u64 {
        self.last_acked.load(Ordering::SeqCst)
    }

    /// Applies a single entry in sequence order.
    ///
    /// Rejects any entry whose sequence does not immediately follow
    /// `last_acked_sequence` with `SequenceGap`; the caller resyncs the
    /// missing range instead. Conflicts on the same trade id resolve
    /// last-writer-by-version-wins.
    pub fn apply(&self, entry: &LogEntry) -> StoreResult<()> {
        let mut trades = self.trades.write().expect("trades lock poisoned");

        let expected = self.last_acked.load(Ordering::SeqCst) + 1;
        if entry.sequence != expected {
            return Err(StoreError::SequenceGap {
                expected,
                got: entry.sequence,
            });
        }

        Self::insert_versioned(&mut trades, &entry.trade);
        self.last_acked.store(entry.sequence, Ordering::SeqCst);
        Ok(())
    }

    /// Applies a contiguous missing range fetched from the primary.
    ///
    /// Entries must be ordered; each is applied with the same gap and
    /// version rules as `apply`.
    pub fn resync(&self, entries: &[LogEntry]) -> StoreResult<()> {
        for entry in entries {
            // Entries at or below our high-water mark were already applied
            if entry.sequence <= self.last_acked_sequence() {
                continue;
            }
            self.apply(entry)?;
        }
        Ok(())
    }

    /// Rebuilds the store from recovered WAL entries.
    ///
    /// Discards current contents. The on-disk layout omits `version`, so
    /// replay re-derives it as the per-key occurrence count in sequence
    /// order; replay order is deterministic, so repeated replays produce
    /// identical state.
    pub fn replay(&self, entries: &[LogEntry]) {
        let mut trades = self.trades.write().expect("trades lock poisoned");
        trades.clear();
        let mut last = 0u64;

        for entry in entries {
            let version = trades
                .get(&entry.trade.id)
                .map(|t: &Trade| t.version + 1)
                .unwrap_or(1);
            let mut trade = entry.trade.clone();
            trade.version = version;
            trades.insert(trade.id, trade);
            last = entry.sequence;
        }

        self.last_acked.store(last, Ordering::SeqCst);
    }

    /// Looks up a trade by id.
    pub fn get(&self, id: &TradeId) -> Option<Trade> {
        self.trades
            .read()
            .expect("trades lock poisoned")
            .get(id)
            .cloned()
    }

    /// Current version for a trade id, 0 if unknown.
    pub fn version_of(&self, id: &TradeId) -> u64 {
        self.trades
            .read()
            .expect("trades lock poisoned")
            .get(id)
            .map(|t| t.version)
            .unwrap_or(0)
    }

    /// Number of distinct trades held.
    pub fn len(&self) -> usize {
        self.trades.read().expect("trades lock poisoned").len()
    }

    /// Whether the store holds no trades.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_versioned(trades: &mut HashMap<TradeId, Trade>, incoming: &Trade) {
        match trades.get(&incoming.id) {
            // Last-writer-by-version-wins: never let an older version
            // overwrite a newer one.
            Some(existing) if existing.version >= incoming.version => {}
            _ => {
                trades.insert(incoming.id, incoming.clone());
            }
        }
    }
}
