//! Top-level ledger facade tying the cluster layers together.

mod facade;
mod report;

pub use facade::TradeLedger;
pub use report::ClusterHealthReport;
