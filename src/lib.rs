//! ledgerdb: a replicated, durable ledger of executed trades.
//!
//! Every acknowledged trade is fsync'd into the primary's write-ahead
//! log before replication begins; quorum writes (`W` of `N` nodes) and
//! quorum reads (`R` of `N`, with `W + R > N`) give read-after-write
//! consistency; heartbeat monitoring and epoch-fenced failover keep a
//! primary available when nodes fail.
//!
//! [`ledger::TradeLedger`] is the top-level entry point; the layers
//! underneath are usable on their own:
//!
//! - [`wal`]: append-only, checksummed, fsync-enforced log
//! - [`store`]: per-node in-memory trade store and node bookkeeping
//! - [`replication`]: primary-to-replica fan-out with gap resync
//! - [`quorum`]: write/read quorum coordination
//! - [`health`]: heartbeat classification and failover
//! - [`observability`]: structured JSON logging

pub mod health;
pub mod ledger;
pub mod observability;
pub mod quorum;
pub mod replication;
pub mod store;
pub mod trade;
pub mod wal;

pub use ledger::{ClusterHealthReport, TradeLedger};
pub use trade::{Side, Trade, TradeId};
