use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A normalized vendor symbol string, e.g. `000001.SZ`.
///
/// Normalization trims whitespace and upper-cases the market suffix, the
/// same shape the adapter's native counterpart expects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolCode(String);

impl SymbolCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(SymbolCode(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One snapshot of market state for a symbol, as emitted by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last_price: Decimal,
    pub volume: u64,
    pub amount: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub ts: DateTime<Utc>,
}

/// An immutable-after-enqueue map of symbol to quote, as delivered by one
/// adapter callback invocation.
pub type TickFrame = BTreeMap<SymbolCode, Quote>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_blank_symbols() {
        assert!(SymbolCode::parse("   ").is_none());
        assert!(SymbolCode::parse("").is_none());
    }

    #[test]
    fn parse_trims_whitespace() {
        let s = SymbolCode::parse("  000001.SZ  ").unwrap();
        assert_eq!(s.as_str(), "000001.SZ");
    }
}
