//! Replication fan-out from the primary to the replica set.
//!
//! Each dispatch runs as its own task with simulated network latency and
//! a per-replica timeout. Ordering is preserved per replica: an entry
//! arriving over a gap triggers a resync of the missing range from the
//! primary's history, never an out-of-order apply.
//!
//! A replica missing its timeout is abandoned and marked Degraded; retry
//! policy belongs to the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::config::ReplicationConfig;
use super::errors::{ReplicationError, ReplicationResult};
use crate::observability::Logger;
use crate::store::{ClusterNode, NodeHealth, NodeId, StoreError};
use crate::wal::LogEntry;

/// Result of a replication call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationOutcome {
    /// Enough replicas acknowledged within the timeout.
    Committed {
        /// Replica acknowledgments received (the primary is not counted).
        replica_acks: usize,
    },
    /// Async dispatch accepted; acknowledgments arrive in the background.
    Pending,
}

/// Propagates committed entries from the primary to all replicas.
pub struct ReplicationManager {
    nodes: Vec<Arc<ClusterNode>>,
    config: ReplicationConfig,
    /// Committed cluster history since sequence 1, the source for
    /// replica resyncs. `history[s - 1]` holds sequence `s`.
    history: Arc<RwLock<Vec<LogEntry>>>,
    /// Outstanding replication dispatches, for observability.
    in_flight: Arc<AtomicUsize>,
}

impl ReplicationManager {
    pub fn new(nodes: Vec<Arc<ClusterNode>>, config: ReplicationConfig) -> Self {
        Self {
            nodes,
            config,
            history: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Merges recovered WAL entries into the committed history.
    ///
    /// Each node's WAL holds only the slice it wrote as primary, so the
    /// batches recovered from different nodes overlap or start
    /// mid-history. Entries are placed by sequence number: ones already
    /// present are kept, ones extending the contiguous run are appended,
    /// anything past a gap is ignored.
    pub fn seed_history(&self, entries: &[LogEntry]) {
        let mut history = self.history.write().expect("history lock poisoned");
        let mut incoming: Vec<&LogEntry> = entries.iter().collect();
        incoming.sort_by_key(|e| e.sequence);
        for entry in incoming {
            if entry.sequence == history.len() as u64 + 1 {
                history.push(entry.clone());
            }
        }
    }

    /// Highest sequence in the committed history, 0 if empty.
    pub fn last_sequence(&self) -> u64 {
        self.history.read().expect("history lock poisoned").len() as u64
    }

    /// Entries with sequence strictly greater than `after`.
    pub fn entries_since(&self, after: u64) -> Vec<LogEntry> {
        let history = self.history.read().expect("history lock poisoned");
        history
            .get(after as usize..)
            .map(<[LogEntry]>::to_vec)
            .unwrap_or_default()
    }

    /// Number of dispatches currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Replicates one committed entry to every replica.
    ///
    /// Sync mode blocks until `required_replica_acks` acknowledgments
    /// arrive or all dispatches resolve, whichever is first, and fails
    /// with `QuorumNotReached` on a shortfall. Async mode records the
    /// entry, spawns the same dispatches, and returns `Pending`
    /// immediately.
    pub async fn replicate(
        &self,
        primary_id: NodeId,
        epoch: u64,
        entry: LogEntry,
        required_replica_acks: usize,
    ) -> ReplicationResult<ReplicationOutcome> {
        self.record(&entry);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatched = 0usize;

        for node in self.nodes.iter().filter(|n| n.id() != primary_id) {
            dispatched += 1;
            self.in_flight.fetch_add(1, Ordering::SeqCst);

            let node = Arc::clone(node);
            let history = Arc::clone(&self.history);
            let in_flight = Arc::clone(&self.in_flight);
            let config = self.config;
            let entry = entry.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let node_id = node.id();
                let result = timeout(
                    config.replica_timeout,
                    Self::dispatch(Arc::clone(&node), epoch, entry, history, config),
                )
                .await;

                let acked = match result {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        Logger::warn(
                            "REPLICA_REJECTED",
                            &[("node", &node_id.to_string()), ("reason", &e.to_string())],
                        );
                        false
                    }
                    Err(_elapsed) => {
                        Self::mark_degraded(&node);
                        false
                    }
                };

                in_flight.fetch_sub(1, Ordering::SeqCst);
                // The receiver may be gone if quorum was already reached
                let _ = tx.send(acked);
            });
        }
        drop(tx);

        if matches!(self.config.mode, super::config::ReplicationMode::Async) {
            return Ok(ReplicationOutcome::Pending);
        }

        let mut acks = 0usize;
        if required_replica_acks == 0 {
            return Ok(ReplicationOutcome::Committed { replica_acks: 0 });
        }

        while let Some(acked) = rx.recv().await {
            if acked {
                acks += 1;
                if acks >= required_replica_acks {
                    // Remaining dispatches keep running in the background;
                    // late acks still advance replica high-water marks.
                    return Ok(ReplicationOutcome::Committed { replica_acks: acks });
                }
            }
        }

        debug_assert!(dispatched >= acks);
        Err(ReplicationError::QuorumNotReached {
            acks,
            required: required_replica_acks,
        })
    }

    /// Single-replica dispatch: simulated latency, then apply, with one
    /// resync round if the replica reports a gap.
    async fn dispatch(
        node: Arc<ClusterNode>,
        epoch: u64,
        entry: LogEntry,
        history: Arc<RwLock<Vec<LogEntry>>>,
        config: ReplicationConfig,
    ) -> Result<(), StoreError> {
        Self::simulate_latency(config).await;

        // A failed node never responds; the caller's timeout fires.
        if node.is_failed() {
            std::future::pending::<()>().await;
        }

        match node.apply_replicated(epoch, &entry) {
            Err(StoreError::SequenceGap { expected, .. }) => {
                let range: Vec<LogEntry> = {
                    let history = history.read().expect("history lock poisoned");
                    history
                        .get((expected - 1) as usize..entry.sequence as usize)
                        .map(<[LogEntry]>::to_vec)
                        .unwrap_or_default()
                };
                Logger::info(
                    "REPLICA_RESYNC",
                    &[
                        ("node", &node.id().to_string()),
                        ("from", &expected.to_string()),
                        ("to", &entry.sequence.to_string()),
                    ],
                );
                node.store().resync(&range)?;

                // A history too short to cover the gap leaves the entry
                // unapplied; that must not count as an acknowledgment
                let applied = node.store().last_acked_sequence();
                if applied < entry.sequence {
                    return Err(StoreError::SequenceGap {
                        expected: applied + 1,
                        got: entry.sequence,
                    });
                }
                Ok(())
            }
            other => other,
        }
    }

    async fn simulate_latency(config: ReplicationConfig) {
        let jitter_ms = config.latency_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        tokio::time::sleep(config.base_latency + std::time::Duration::from_millis(jitter)).await;
    }

    fn mark_degraded(node: &ClusterNode) {
        // Never resurrect a Failed node from the write path
        if node.health() == NodeHealth::Healthy {
            node.set_health(NodeHealth::Degraded);
            Logger::warn(
                "NODE_DEGRADED",
                &[("node", &node.id().to_string()), ("cause", "replication timeout")],
            );
        }
    }

    fn record(&self, entry: &LogEntry) {
        let mut history = self.history.write().expect("history lock poisoned");
        if history.len() as u64 + 1 == entry.sequence {
            history.push(entry.clone());
        }
    }
}
