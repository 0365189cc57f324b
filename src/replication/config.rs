//! Replication configuration.
//!
//! Configured in code at cluster construction, immutable afterwards.

use std::time::Duration;

/// How committed entries propagate to replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    /// The writer blocks until enough replica acknowledgments arrive or
    /// the timeout elapses. Latency is bounded by the slowest of the `W`
    /// fastest replicas, not the sum of all replica latencies.
    Sync,
    /// Dispatch returns immediately; acknowledgments are collected in the
    /// background. Consistency is eventual: a crash before all replicas
    /// ack can lose the unreplicated tail beyond the primary's WAL.
    Async,
}

/// Tunables for the replication fan-out and its simulated network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Propagation mode for the write path.
    pub mode: ReplicationMode,
    /// Per-replica dispatch timeout. A replica missing it is abandoned
    /// (not retried) and marked Degraded.
    pub replica_timeout: Duration,
    /// Fixed component of the simulated per-replica network latency.
    pub base_latency: Duration,
    /// Upper bound of the random jitter added to `base_latency`.
    pub latency_jitter: Duration,
}

impl ReplicationConfig {
    /// Synchronous replication with the default timings.
    pub fn sync() -> Self {
        Self {
            mode: ReplicationMode::Sync,
            ..Self::default()
        }
    }

    /// Asynchronous replication with the default timings.
    pub fn async_mode() -> Self {
        Self {
            mode: ReplicationMode::Async,
            ..Self::default()
        }
    }

    /// Fast timings for tests.
    pub fn fast(mode: ReplicationMode) -> Self {
        Self {
            mode,
            replica_timeout: Duration::from_millis(100),
            base_latency: Duration::from_millis(1),
            latency_jitter: Duration::from_millis(2),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            mode: ReplicationMode::Sync,
            replica_timeout: Duration::from_millis(250),
            base_latency: Duration::from_millis(5),
            latency_jitter: Duration::from_millis(10),
        }
    }
}
