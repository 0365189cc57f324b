//! Heartbeat-driven health classification and primary failover.

mod errors;
mod failover;
mod monitor;

pub use errors::{HealthError, HealthResult};
pub use failover::{FailoverController, PrimaryLease};
pub use monitor::{HealthConfig, HealthMonitor};
