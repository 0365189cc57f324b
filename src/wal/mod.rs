//! Write-Ahead Log (WAL) subsystem.
//!
//! The WAL is the authoritative durability mechanism and the sole
//! ordering authority for the ledger. No acknowledged write exists unless
//! it is fully persisted here.
//!
//! # Invariants Enforced
//!
//! - fsync before acknowledgment
//! - Strictly increasing sequence numbers per primary epoch
//! - Checksums on every record
//! - Halt on corruption: a gapped or checksum-failing complete record
//!   halts replay; only a torn final record is tolerated

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{Severity, WalError, WalErrorCode, WalResult};
pub use reader::{recover, WalReader};
pub use record::{complete_lines, LogEntry, FIELD_DELIMITER};
pub use writer::WalWriter;
