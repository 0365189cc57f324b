//! WAL record layout.
//!
//! One entry per line, `|`-delimited, newline-terminated:
//!
//! ```text
//! sequence|trade_id|symbol|side|price|quantity|checksum
//! ```
//!
//! The checksum is a CRC32 (hex, 8 digits) over the line text preceding
//! it. This layout is the stable recovery contract: recovery scans from
//! the start, and an unterminated final line (torn write) ends the scan
//! cleanly with the log up to that point as the recovered state.
//!
//! `version` is intentionally not persisted. Replay re-derives it as the
//! per-key occurrence count in sequence order, which is deterministic and
//! keeps recovery idempotent.

use std::io::{self, Read, Write};

use super::checksum::{compute_checksum, verify_checksum};
use crate::trade::{Side, Trade, TradeId};

/// Field delimiter for WAL lines.
pub const FIELD_DELIMITER: char = '|';

/// A sequenced, checksummed log entry.
///
/// Owned by the WAL until applied; replication passes entries by value.
/// The in-memory form carries the primary-assigned `version` even though
/// the on-disk layout omits it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Strictly increasing per primary epoch; the sole ordering authority.
    pub sequence: u64,
    /// The trade payload.
    pub trade: Trade,
    /// CRC32 over the encoded fields.
    pub checksum: u32,
}

impl LogEntry {
    /// Create an entry, computing its checksum from the encoded fields.
    pub fn new(sequence: u64, trade: Trade) -> Self {
        let checksum = compute_checksum(Self::encode_fields(sequence, &trade).as_bytes());
        Self {
            sequence,
            trade,
            checksum,
        }
    }

    fn encode_fields(sequence: u64, trade: &Trade) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            sequence, trade.id, trade.symbol, trade.side, trade.price, trade.quantity
        )
    }

    /// Encode to the on-disk line, without the trailing newline.
    pub fn encode_line(&self) -> String {
        let fields = Self::encode_fields(self.sequence, &self.trade);
        format!("{}|{:08x}", fields, self.checksum)
    }

    /// Serialize to bytes including the record boundary (newline).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut line = self.encode_line().into_bytes();
        line.push(b'\n');
        line
    }

    /// Recompute the checksum and compare against the stored one.
    pub fn verify(&self) -> bool {
        verify_checksum(
            Self::encode_fields(self.sequence, &self.trade).as_bytes(),
            self.checksum,
        )
    }

    /// Decode a complete WAL line (without its newline).
    ///
    /// Validates field count, field syntax, and the checksum. The decoded
    /// trade carries `version: 0`; replay assigns the real version.
    pub fn decode_line(line: &str) -> io::Result<Self> {
        let parts: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if parts.len() != 7 {
            return Err(malformed(format!(
                "expected 7 fields, got {}",
                parts.len()
            )));
        }

        let sequence: u64 = parts[0]
            .parse()
            .map_err(|_| malformed(format!("invalid sequence: {:?}", parts[0])))?;
        let id: TradeId = parts[1]
            .parse()
            .map_err(|_| malformed(format!("invalid trade id: {:?}", parts[1])))?;
        let symbol = parts[2].to_string();
        let side = Side::parse(parts[3])
            .ok_or_else(|| malformed(format!("invalid side: {:?}", parts[3])))?;
        let price: f64 = parts[4]
            .parse()
            .map_err(|_| malformed(format!("invalid price: {:?}", parts[4])))?;
        let quantity: f64 = parts[5]
            .parse()
            .map_err(|_| malformed(format!("invalid quantity: {:?}", parts[5])))?;
        let stored_checksum = u32::from_str_radix(parts[6], 16)
            .map_err(|_| malformed(format!("invalid checksum: {:?}", parts[6])))?;

        let trade = Trade::with_version(id, symbol, side, price, quantity, 0);
        if !verify_checksum(
            Self::encode_fields(sequence, &trade).as_bytes(),
            stored_checksum,
        ) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "checksum mismatch at sequence {}: stored {:08x}",
                    sequence, stored_checksum
                ),
            ));
        }

        Ok(Self {
            sequence,
            trade,
            checksum: stored_checksum,
        })
    }

    /// Write the encoded record to a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Read and decode all complete records from a reader.
    ///
    /// Stops cleanly at a trailing unterminated line. Structural errors in
    /// complete lines surface as `InvalidData`.
    pub fn read_all<R: Read>(reader: &mut R) -> io::Result<Vec<Self>> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        let mut entries = Vec::new();
        for raw in complete_lines(&buf) {
            let line = std::str::from_utf8(raw)
                .map_err(|_| malformed("record is not valid UTF-8"))?;
            entries.push(Self::decode_line(line)?);
        }
        Ok(entries)
    }
}

/// Yields the newline-terminated lines of `data`, excluding any trailing
/// bytes after the final newline (a torn final write).
pub fn complete_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let end = data
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    data[..end].split(|&b| b == b'\n').filter(|l| !l.is_empty())
}

fn malformed(reason: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.into())
}
