//! WAL reader with strict corruption detection.
//!
//! Replay rules:
//! - Records are replayed strictly in sequence order, from the start.
//! - A trailing unterminated line is a torn final write: the scan stops
//!   cleanly and the log up to that point is the recovered state.
//! - A complete record that is malformed, fails its checksum, or breaks
//!   sequence contiguity is corruption. Corruption halts replay and is
//!   surfaced to the caller; there is no partial replay past it, no
//!   skipping, and no repair attempt.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::errors::{WalError, WalResult};
use super::record::{complete_lines, LogEntry};

/// Sequential WAL reader.
pub struct WalReader {
    /// Path to the WAL file
    wal_path: PathBuf,
    /// Complete (newline-terminated) lines of the log
    lines: Vec<String>,
    /// Whether the file ended in an unterminated record
    torn_tail: bool,
    /// Index of the next line to decode
    cursor: usize,
    /// Last successfully read sequence number (0 before the first read)
    last_sequence: u64,
}

impl WalReader {
    /// Opens a WAL file for reading.
    pub fn open(wal_path: &Path) -> WalResult<Self> {
        let data = fs::read(wal_path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                WalError::corruption(format!("WAL file not found: {}", wal_path.display()))
            } else {
                WalError::corruption(format!(
                    "failed to open WAL file: {}: {}",
                    wal_path.display(),
                    e
                ))
            }
        })?;

        let terminated_len = data
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let torn_tail = terminated_len < data.len();

        let mut lines = Vec::new();
        for (idx, raw) in complete_lines(&data).enumerate() {
            let line = std::str::from_utf8(raw).map_err(|_| {
                WalError::corruption_at_line(idx + 1, "record is not valid UTF-8")
            })?;
            lines.push(line.to_string());
        }

        Ok(Self {
            wal_path: wal_path.to_path_buf(),
            lines,
            torn_tail,
            cursor: 0,
            last_sequence: 0,
        })
    }

    /// Opens the WAL from a node data directory
    /// (`<data_dir>/wal/ledger.wal`).
    pub fn open_from_data_dir(data_dir: &Path) -> WalResult<Self> {
        let wal_path = data_dir.join("wal").join("ledger.wal");
        Self::open(&wal_path)
    }

    /// Returns the path to the WAL file.
    pub fn path(&self) -> &Path {
        &self.wal_path
    }

    /// Returns whether the file ended in a torn (unterminated) record.
    pub fn has_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Returns the last successfully read sequence number.
    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence
    }

    /// Reads the next record.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(entry))` on success
    /// - `Ok(None)` at clean end of log (including before a torn tail)
    /// - `Err` with `LGR_WAL_CORRUPTION` on any structural failure
    pub fn read_next(&mut self) -> WalResult<Option<LogEntry>> {
        let Some(line) = self.lines.get(self.cursor) else {
            return Ok(None);
        };
        let line_no = self.cursor + 1;

        let entry = LogEntry::decode_line(line)
            .map_err(|e| WalError::corruption_at_line(line_no, e.to_string()))?;

        // Contiguity within a file: each record follows its predecessor.
        // The first record may start above 1 on a node promoted mid-history.
        if self.last_sequence > 0 && entry.sequence != self.last_sequence + 1 {
            return Err(WalError::corruption_at_sequence(
                entry.sequence,
                format!(
                    "non-sequential sequence number: expected {}, got {}",
                    self.last_sequence + 1,
                    entry.sequence
                ),
            ));
        }

        self.cursor += 1;
        self.last_sequence = entry.sequence;
        Ok(Some(entry))
    }

    /// Reads all records in sequence order.
    pub fn read_all(&mut self) -> WalResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_next()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Resets the reader to the beginning of the log.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.last_sequence = 0;
    }
}

/// Recovers the full ordered entry list from a node data directory.
///
/// Returns an empty list if no WAL file exists yet (a node that has never
/// written is validly empty).
pub fn recover(data_dir: &Path) -> WalResult<Vec<LogEntry>> {
    let wal_path = data_dir.join("wal").join("ledger.wal");
    if !wal_path.exists() {
        return Ok(Vec::new());
    }
    WalReader::open(&wal_path)?.read_all()
}
