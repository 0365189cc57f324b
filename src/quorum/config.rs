//! Cluster sizing and quorum configuration.

use super::errors::ConfigError;

/// Validated cluster sizing: `N` nodes, `W` write quorum, `R` read
/// quorum, with `W + R > N` so every read set intersects every write
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterConfig {
    pub node_count: usize,
    pub write_quorum: usize,
    pub read_quorum: usize,
    /// Epoch the cluster starts in; bumped on every failover.
    pub initial_epoch: u64,
}

impl ClusterConfig {
    /// Validates `1 <= W,R <= N` and `W + R > N` at construction, so an
    /// unsound configuration can never reach the write path.
    pub fn new(
        node_count: usize,
        write_quorum: usize,
        read_quorum: usize,
    ) -> Result<Self, ConfigError> {
        let in_range = |q: usize| (1..=node_count).contains(&q);
        if node_count == 0
            || !in_range(write_quorum)
            || !in_range(read_quorum)
            || write_quorum + read_quorum <= node_count
        {
            return Err(ConfigError::InvalidQuorum {
                node_count,
                write_quorum,
                read_quorum,
            });
        }
        Ok(Self {
            node_count,
            write_quorum,
            read_quorum,
            initial_epoch: 1,
        })
    }

    /// Majority quorums for both reads and writes.
    pub fn majority(node_count: usize) -> Result<Self, ConfigError> {
        let quorum = node_count / 2 + 1;
        Self::new(node_count, quorum, quorum)
    }

    /// Replica acknowledgments a write needs beyond the primary's own.
    pub fn required_replica_acks(&self) -> usize {
        self.write_quorum - 1
    }
}
