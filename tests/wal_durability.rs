//! Durability invariants of the write-ahead log across process restarts.
//!
//! A writer going out of scope stands in for a crash: append fsyncs
//! before returning, so anything acknowledged must be recoverable.

use std::fs::{self, OpenOptions};
use std::io::Write;

use ledgerdb::trade::{Side, Trade};
use ledgerdb::wal::{self, LogEntry, WalErrorCode, WalWriter};
use tempfile::TempDir;

fn sample_trade(symbol: &str, price: f64) -> Trade {
    Trade::new(symbol, Side::Buy, price, 1.0)
}

#[test]
fn acknowledged_appends_survive_restart() {
    let dir = TempDir::new().unwrap();
    let mut written_ids = Vec::new();

    {
        let mut writer = WalWriter::open(dir.path()).unwrap();
        for (symbol, price) in [("BTC/USD", 42_000.0), ("ETH/USD", 2_800.0), ("SOL/USD", 150.0)] {
            let trade = sample_trade(symbol, price);
            written_ids.push(trade.id);
            writer.append(&trade).unwrap();
        }
    }
    // Writer dropped without any explicit flush: the appends were
    // already fsync'd

    let recovered = wal::recover(dir.path()).unwrap();
    assert_eq!(recovered.len(), 3);
    for (i, entry) in recovered.iter().enumerate() {
        assert_eq!(entry.sequence, (i + 1) as u64);
        assert_eq!(entry.trade.id, written_ids[i]);
    }

    // A new writer continues the sequence, never reuses numbers
    let mut writer = WalWriter::open(dir.path()).unwrap();
    let entry = writer.append(&sample_trade("BTC/USD", 43_000.0)).unwrap();
    assert_eq!(entry.sequence, 4);
}

#[test]
fn torn_tail_is_tolerated() {
    let dir = TempDir::new().unwrap();
    {
        let mut writer = WalWriter::open(dir.path()).unwrap();
        writer.append(&sample_trade("BTC/USD", 42_000.0)).unwrap();
        writer.append(&sample_trade("ETH/USD", 2_800.0)).unwrap();
    }

    // A crash mid-append leaves an unterminated final record
    let wal_path = dir.path().join("wal").join("ledger.wal");
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(b"3|half-written-record-with-no-newl").unwrap();
    drop(file);

    // Recovery stops cleanly at the last complete record
    let recovered = wal::recover(dir.path()).unwrap();
    assert_eq!(recovered.len(), 2);
    assert_eq!(recovered[1].sequence, 2);
}

#[test]
fn corrupt_complete_record_halts_recovery() {
    let dir = TempDir::new().unwrap();
    {
        let mut writer = WalWriter::open(dir.path()).unwrap();
        for price in [1.0, 2.0, 3.0] {
            writer.append(&sample_trade("BTC/USD", price)).unwrap();
        }
    }

    // Flip one payload byte in the middle record; its checksum no
    // longer matches
    let wal_path = dir.path().join("wal").join("ledger.wal");
    let contents = fs::read_to_string(&wal_path).unwrap();
    let mut lines: Vec<String> = contents.lines().map(String::from).collect();
    lines[1] = lines[1].replacen("BTC", "XTC", 1);
    fs::write(&wal_path, lines.join("\n") + "\n").unwrap();

    let err = wal::recover(dir.path()).unwrap_err();
    assert_eq!(err.code(), WalErrorCode::LgrWalCorruption);
    assert!(err.is_fatal());
}

#[test]
fn sequence_gap_in_log_is_corruption() {
    let dir = TempDir::new().unwrap();
    let wal_dir = dir.path().join("wal");
    fs::create_dir_all(&wal_dir).unwrap();

    // A log jumping from 1 to 3 cannot have been written by the
    // fsync-per-append writer
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&LogEntry::new(1, sample_trade("BTC/USD", 1.0)).to_bytes());
    bytes.extend_from_slice(&LogEntry::new(3, sample_trade("ETH/USD", 2.0)).to_bytes());
    fs::write(wal_dir.join("ledger.wal"), bytes).unwrap();

    let err = wal::recover(dir.path()).unwrap_err();
    assert_eq!(err.code(), WalErrorCode::LgrWalCorruption);
}

#[test]
fn recovery_is_deterministic() {
    let dir = TempDir::new().unwrap();
    {
        let mut writer = WalWriter::open(dir.path()).unwrap();
        for price in [10.0, 20.0, 30.0, 40.0] {
            writer.append(&sample_trade("ETH/USD", price)).unwrap();
        }
    }

    let first = wal::recover(dir.path()).unwrap();
    let second = wal::recover(dir.path()).unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.sequence, b.sequence);
        assert_eq!(a.trade.id, b.trade.id);
        assert_eq!(a.checksum, b.checksum);
    }
}

#[test]
fn empty_and_missing_logs_recover_to_nothing() {
    let dir = TempDir::new().unwrap();
    // No WAL file at all
    assert!(wal::recover(dir.path()).unwrap().is_empty());

    // Empty WAL file
    let wal_dir = dir.path().join("wal");
    fs::create_dir_all(&wal_dir).unwrap();
    fs::write(wal_dir.join("ledger.wal"), b"").unwrap();
    assert!(wal::recover(dir.path()).unwrap().is_empty());
}
