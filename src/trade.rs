//! Trade domain types shared by the WAL, stores, and coordinator.
//!
//! A `Trade` is the payload the ledger replicates. It is immutable once
//! written: corrections are new entries with a higher `version`, never
//! in-place edits. `version` increases monotonically per trade id and is
//! the conflict-resolution authority (last-writer-by-version-wins).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a trade record.
pub type TradeId = Uuid;

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire/WAL text encoding.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Parse from the WAL text encoding. Returns `None` for unknown text.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single trade record.
///
/// `version` starts at 1 for a new trade id and increments on each
/// correction. It is assigned by the primary at write time and re-derived
/// deterministically during WAL replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub version: u64,
}

impl Trade {
    /// Create a first-version trade with a fresh id.
    pub fn new(symbol: impl Into<String>, side: Side, price: f64, quantity: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            price,
            quantity,
            version: 1,
        }
    }

    /// Create a trade with an explicit id and version.
    pub fn with_version(
        id: TradeId,
        symbol: impl Into<String>,
        side: Side,
        price: f64,
        quantity: f64,
        version: u64,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            price,
            quantity,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_text_roundtrip() {
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(Side::parse(side.as_str()), Some(side));
        }
    }

    #[test]
    fn test_side_rejects_unknown_text() {
        assert!(Side::parse("HOLD").is_none());
        assert!(Side::parse("buy").is_none());
        assert!(Side::parse("").is_none());
    }

    #[test]
    fn test_new_trade_starts_at_version_one() {
        let trade = Trade::new("BTC/USD", Side::Buy, 42_000.0, 0.5);
        assert_eq!(trade.version, 1);
    }

    #[test]
    fn test_new_trades_get_unique_ids() {
        let a = Trade::new("BTC/USD", Side::Buy, 42_000.0, 0.5);
        let b = Trade::new("BTC/USD", Side::Buy, 42_000.0, 0.5);
        assert_ne!(a.id, b.id);
    }
}
