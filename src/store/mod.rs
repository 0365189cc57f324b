//! Per-node state: the in-memory trade store and node bookkeeping.
//!
//! Each node owns its own store; there is no cross-node shared memory.
//! Recovery rebuilds a store from the node's WAL.

mod errors;
mod node;
mod replica;

pub use errors::{StoreError, StoreResult};
pub use node::{ClusterNode, NodeHealth, NodeId, NodeRole, NodeState};
pub use replica::ReplicaStore;
