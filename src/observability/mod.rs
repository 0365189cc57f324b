//! Structured logging for cluster events.

mod logger;

pub use logger::{LogLevel, Logger};
