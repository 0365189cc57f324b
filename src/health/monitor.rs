//! Heartbeat-based health classification.
//!
//! Health degrades on heartbeat age alone: a node that has not sent a
//! heartbeat for `degraded_after` is Degraded, for `failed_after` is
//! Failed. Failed is sticky; only explicit recovery (resync first)
//! returns a node to Healthy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{HealthError, HealthResult};
use crate::observability::Logger;
use crate::store::{ClusterNode, NodeHealth, NodeId, NodeState};

/// Heartbeat-age thresholds for health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Heartbeat age at which a node becomes Degraded.
    pub degraded_after: Duration,
    /// Heartbeat age at which a node becomes Failed.
    pub failed_after: Duration,
}

impl HealthConfig {
    /// Tight thresholds for tests.
    pub fn fast() -> Self {
        Self {
            degraded_after: Duration::from_millis(50),
            failed_after: Duration::from_millis(200),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: Duration::from_secs(1),
            failed_after: Duration::from_secs(3),
        }
    }
}

/// Classifies every node's health from its heartbeat age.
pub struct HealthMonitor {
    nodes: Vec<Arc<ClusterNode>>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(nodes: Vec<Arc<ClusterNode>>, config: HealthConfig) -> Self {
        Self { nodes, config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn node(&self, id: NodeId) -> HealthResult<&Arc<ClusterNode>> {
        self.nodes
            .iter()
            .find(|n| n.id() == id)
            .ok_or(HealthError::UnknownNode(id))
    }

    /// Records a heartbeat from one node.
    pub fn heartbeat(&self, id: NodeId) -> HealthResult<()> {
        self.node(id)?.heartbeat();
        Ok(())
    }

    /// Records heartbeats from every node that is not Failed. Failed
    /// nodes are silent until explicitly recovered.
    pub fn heartbeat_all(&self) {
        for node in &self.nodes {
            if !node.is_failed() {
                node.heartbeat();
            }
        }
    }

    /// Reclassifies every node by heartbeat age and returns a snapshot.
    ///
    /// Failed is never left by classification; Degraded returns to
    /// Healthy as soon as a fresh heartbeat arrives.
    pub fn check_health(&self) -> HashMap<NodeId, NodeState> {
        let mut states = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !node.is_failed() {
                let age = node.heartbeat_age();
                let classified = if age >= self.config.failed_after {
                    NodeHealth::Failed
                } else if age >= self.config.degraded_after {
                    NodeHealth::Degraded
                } else {
                    NodeHealth::Healthy
                };
                if classified != node.health() {
                    self.transition(node, classified, age);
                }
            }
            states.insert(node.id(), node.state());
        }
        states
    }

    fn transition(&self, node: &ClusterNode, to: NodeHealth, age: Duration) {
        node.set_health(to);
        let fields = [
            ("node", node.id().to_string()),
            ("health", format!("{to:?}")),
            ("heartbeat_age_ms", age.as_millis().to_string()),
        ];
        let fields: Vec<(&str, &str)> =
            fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        match to {
            NodeHealth::Failed => Logger::error("NODE_FAILED", &fields),
            NodeHealth::Degraded => Logger::warn("NODE_DEGRADED", &fields),
            NodeHealth::Healthy => Logger::info("NODE_RECOVERED", &fields),
        }
    }

    /// Marks a node Failed immediately, bypassing heartbeat aging.
    pub fn mark_failed(&self, id: NodeId) -> HealthResult<()> {
        let node = self.node(id)?;
        node.set_health(NodeHealth::Failed);
        Logger::warn("NODE_FAILED", &[("node", &id.to_string()), ("cause", "operator")]);
        Ok(())
    }

    /// Returns a node to Healthy after the caller has resynced it.
    pub fn mark_recovered(&self, id: NodeId) -> HealthResult<()> {
        let node = self.node(id)?;
        node.heartbeat();
        node.set_health(NodeHealth::Healthy);
        Logger::info("NODE_RECOVERED", &[("node", &id.to_string())]);
        Ok(())
    }
}
