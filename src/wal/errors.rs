//! WAL error types.
//!
//! Error codes:
//! - LGR_WAL_APPEND_FAILED (ERROR severity)
//! - LGR_WAL_FSYNC_FAILED (FATAL severity)
//! - LGR_WAL_CORRUPTION (FATAL severity)
//!
//! A FATAL error means the node must stop accepting writes until an
//! operator intervenes. Corruption is surfaced, never auto-repaired.

use std::fmt;
use std::io;

/// Severity levels for WAL errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, node continues
    Error,
    /// Node must stop accepting writes
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// WAL-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalErrorCode {
    /// WAL write failed
    LgrWalAppendFailed,
    /// WAL fsync failed
    LgrWalFsyncFailed,
    /// WAL checksum/structure failure
    LgrWalCorruption,
}

impl WalErrorCode {
    /// Returns the stable string code.
    pub fn code(&self) -> &'static str {
        match self {
            WalErrorCode::LgrWalAppendFailed => "LGR_WAL_APPEND_FAILED",
            WalErrorCode::LgrWalFsyncFailed => "LGR_WAL_FSYNC_FAILED",
            WalErrorCode::LgrWalCorruption => "LGR_WAL_CORRUPTION",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            WalErrorCode::LgrWalAppendFailed => Severity::Error,
            WalErrorCode::LgrWalFsyncFailed => Severity::Fatal,
            WalErrorCode::LgrWalCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for WalErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// WAL error with code, message, and optional context.
#[derive(Debug)]
pub struct WalError {
    code: WalErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl WalError {
    /// Create a new WAL append failed error.
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: WalErrorCode::LgrWalAppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new WAL fsync failed error.
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: WalErrorCode::LgrWalFsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new WAL corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::LgrWalCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Corruption error with line-number context.
    pub fn corruption_at_line(line: usize, reason: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::LgrWalCorruption,
            message: reason.into(),
            details: Some(format!("line: {}", line)),
            source: None,
        }
    }

    /// Corruption error with sequence-number context.
    pub fn corruption_at_sequence(sequence: u64, reason: impl Into<String>) -> Self {
        Self {
            code: WalErrorCode::LgrWalCorruption,
            message: reason.into(),
            details: Some(format!("sequence: {}", sequence)),
            source: None,
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> WalErrorCode {
        self.code
    }

    /// Returns the severity level.
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error context.
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error requires the node to stop accepting writes.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for WalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;
