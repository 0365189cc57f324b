//! WAL writer with fsync enforcement.
//!
//! Every append is flushed to stable storage before the call returns. No
//! acknowledged write exists unless it is fully persisted in the WAL.
//! Acknowledgment before fsync is forbidden.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::errors::{WalError, WalResult};
use super::reader::WalReader;
use super::record::LogEntry;
use crate::trade::Trade;

/// Append-only WAL writer.
///
/// The file is opened with append access and never truncated. The
/// sequence counter survives restart by scanning existing entries on open.
pub struct WalWriter {
    /// Path to the WAL file
    wal_path: PathBuf,
    /// Underlying file handle
    file: File,
    /// Next sequence number to assign (starts at 1, never reused)
    next_sequence: u64,
}

impl WalWriter {
    /// Opens or creates a WAL file under the given data directory.
    ///
    /// Creates `<data_dir>/wal/ledger.wal` and parent directories if
    /// needed.
    ///
    /// # Errors
    ///
    /// `LGR_WAL_APPEND_FAILED` if the file cannot be created or opened,
    /// `LGR_WAL_CORRUPTION` if the existing log is unreadable.
    pub fn open(data_dir: &Path) -> WalResult<Self> {
        let wal_dir = data_dir.join("wal");
        let wal_path = wal_dir.join("ledger.wal");

        if !wal_dir.exists() {
            fs::create_dir_all(&wal_dir).map_err(|e| {
                WalError::append_failed(
                    format!("failed to create WAL directory: {}", wal_dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .map_err(|e| {
                WalError::append_failed(
                    format!("failed to open WAL file: {}", wal_path.display()),
                    e,
                )
            })?;

        let next_sequence = Self::determine_next_sequence(&wal_path)?;

        Ok(Self {
            wal_path,
            file,
            next_sequence,
        })
    }

    /// Determines the next sequence number by scanning the existing WAL.
    ///
    /// Returns 1 if the WAL is empty or does not exist.
    fn determine_next_sequence(wal_path: &Path) -> WalResult<u64> {
        let metadata = match fs::metadata(wal_path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(WalError::append_failed("failed to read WAL metadata", e)),
        };

        if metadata.len() == 0 {
            return Ok(1);
        }

        let mut reader = WalReader::open(wal_path)?;
        let mut last = 0u64;
        while let Some(entry) = reader.read_next()? {
            last = entry.sequence;
        }
        Ok(if last == 0 { 1 } else { last + 1 })
    }

    /// Returns the path to the WAL file.
    pub fn path(&self) -> &Path {
        &self.wal_path
    }

    /// Returns the next sequence number that will be assigned.
    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence
    }

    /// Returns the last assigned sequence number, or 0 if none.
    pub fn last_sequence_number(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Fast-forwards the sequence counter.
    ///
    /// Used when a replica is promoted to primary: its own WAL may lag the
    /// cluster's committed history, and new entries must continue the
    /// cluster-wide sequence rather than reuse numbers.
    pub fn advance_to(&mut self, next_sequence: u64) {
        if next_sequence > self.next_sequence {
            self.next_sequence = next_sequence;
        }
    }

    /// Appends a trade to the WAL with fsync enforcement.
    ///
    /// Assigns the next sequence number, writes the encoded line, and
    /// flushes to disk before returning the entry.
    ///
    /// # Errors
    ///
    /// - `LGR_WAL_APPEND_FAILED` if the payload is unencodable or the
    ///   write fails
    /// - `LGR_WAL_FSYNC_FAILED` if fsync fails (FATAL)
    pub fn append(&mut self, trade: &Trade) -> WalResult<LogEntry> {
        if trade.symbol.contains(super::record::FIELD_DELIMITER)
            || trade.symbol.contains('\n')
        {
            return Err(WalError::append_failed(
                format!("symbol contains reserved characters: {:?}", trade.symbol),
                io::Error::new(io::ErrorKind::InvalidInput, "unencodable symbol"),
            ));
        }

        let sequence = self.next_sequence;
        let entry = LogEntry::new(sequence, trade.clone());

        self.file.write_all(&entry.to_bytes()).map_err(|e| {
            WalError::append_failed(
                format!("failed to write WAL record at sequence {}", sequence),
                e,
            )
        })?;

        // fsync is mandatory and FATAL if it fails
        self.file.sync_all().map_err(|e| {
            WalError::fsync_failed(
                format!("fsync failed after WAL append at sequence {}", sequence),
                e,
            )
        })?;

        // Only increment after successful fsync
        self.next_sequence += 1;

        Ok(entry)
    }

    /// Appends already-sequenced entries from the committed history.
    ///
    /// Used to catch a node's log up after a restart or promotion, so
    /// the file stays contiguous when new appends continue past it.
    /// Entries at or below the current tail are skipped; the batch is
    /// covered by a single fsync.
    ///
    /// # Errors
    ///
    /// - `LGR_WAL_APPEND_FAILED` if the range skips past the tail or a
    ///   write fails
    /// - `LGR_WAL_FSYNC_FAILED` if fsync fails (FATAL)
    pub fn catch_up(&mut self, entries: &[LogEntry]) -> WalResult<()> {
        let mut wrote = false;
        for entry in entries {
            if entry.sequence < self.next_sequence {
                continue;
            }
            if entry.sequence > self.next_sequence {
                return Err(WalError::append_failed(
                    format!(
                        "catch-up range skips sequence {}, got {}",
                        self.next_sequence, entry.sequence
                    ),
                    io::Error::new(io::ErrorKind::InvalidInput, "non-contiguous catch-up"),
                ));
            }
            self.file.write_all(&entry.to_bytes()).map_err(|e| {
                WalError::append_failed(
                    format!("failed to write WAL record at sequence {}", entry.sequence),
                    e,
                )
            })?;
            self.next_sequence = entry.sequence + 1;
            wrote = true;
        }
        if wrote {
            self.file
                .sync_all()
                .map_err(|e| WalError::fsync_failed("fsync failed after WAL catch-up", e))?;
        }
        Ok(())
    }

    /// Explicitly fsync the WAL file.
    pub fn fsync(&self) -> WalResult<()> {
        self.file
            .sync_all()
            .map_err(|e| WalError::fsync_failed("explicit WAL fsync failed", e))
    }
}
