//! Agent holdings: cash plus signed share positions.
//!
//! Cash is integer cents and lives in its own field rather than as a magic
//! key in the position map, so share counts and money can never be confused.
//! Positions may be negative (short); the at-risk admission rule in the
//! trading agent bounds how far.

use crate::models::dollarize;
use crate::models::order::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cash plus per-symbol signed share counts.
///
/// Uses a `BTreeMap` so iteration order (and therefore mark-to-market log
/// order) is deterministic.
///
/// # Example
/// ```
/// use market_simulator_core_rs::Holdings;
///
/// let mut h = Holdings::with_cash(1_000_000);
/// h.apply_fill("ABM", 100, 5_000); // buy 100 shares at $50.00
/// assert_eq!(h.position("ABM"), 100);
/// assert_eq!(h.cash(), 500_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holdings {
    cash_cents: i64,
    positions: BTreeMap<Symbol, i64>,
}

impl Holdings {
    /// Start with cash only and no positions.
    pub fn with_cash(cash_cents: i64) -> Self {
        Self {
            cash_cents,
            positions: BTreeMap::new(),
        }
    }

    pub fn cash(&self) -> i64 {
        self.cash_cents
    }

    /// Signed share count for a symbol; zero when not held.
    pub fn position(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn positions(&self) -> &BTreeMap<Symbol, i64> {
        &self.positions
    }

    /// Apply an execution: move shares and the offsetting cash.
    ///
    /// `signed_qty` is positive for a buy, negative for a sell. A position
    /// that reaches zero is removed from the map.
    pub fn apply_fill(&mut self, symbol: &str, signed_qty: i64, fill_price: i64) {
        let entry = self.positions.entry(symbol.to_string()).or_insert(0);
        *entry += signed_qty;
        if *entry == 0 {
            self.positions.remove(symbol);
        }
        self.cash_cents -= signed_qty * fill_price;
    }

    /// Hypothetical holdings with `signed_qty` more shares of `symbol`.
    ///
    /// Used for admission checks; cash is unchanged because the check
    /// compares at-risk exposure, not settlement.
    pub fn with_position(&self, symbol: &str, signed_qty: i64) -> Holdings {
        let mut next = self.clone();
        let entry = next.positions.entry(symbol.to_string()).or_insert(0);
        *entry += signed_qty;
        if *entry == 0 {
            next.positions.remove(symbol);
        }
        next
    }

    /// Value everything at the given last-trade prices, including cash.
    ///
    /// Returns `None` when some held symbol has no known price; exposure
    /// cannot be measured without one.
    pub fn mark_to_market(&self, prices: &BTreeMap<Symbol, i64>) -> Option<i64> {
        let mut total = self.cash_cents;
        for (symbol, shares) in &self.positions {
            total += prices.get(symbol)? * shares;
        }
        Some(total)
    }

    /// Mark-to-market value minus cash: the net long/short exposure.
    pub fn at_risk(&self, prices: &BTreeMap<Symbol, i64>) -> Option<i64> {
        Some(self.mark_to_market(prices)? - self.cash_cents)
    }
}

impl fmt::Display for Holdings {
    /// `{ ABM: 30, CASH: $99.00 }` style, symbols sorted, cash last.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (symbol, shares) in &self.positions {
            write!(f, "{}: {}, ", symbol, shares)?;
        }
        write!(f, "CASH: {} }}", dollarize(self.cash_cents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_fill_buy_then_sell_flat() {
        let mut h = Holdings::with_cash(100_000);
        h.apply_fill("ABM", 10, 1_000);
        assert_eq!(h.position("ABM"), 10);
        assert_eq!(h.cash(), 90_000);

        h.apply_fill("ABM", -10, 1_100);
        assert_eq!(h.position("ABM"), 0);
        assert!(h.positions().is_empty(), "flat position must be removed");
        assert_eq!(h.cash(), 101_000);
    }

    #[test]
    fn test_short_position_is_negative() {
        let mut h = Holdings::with_cash(0);
        h.apply_fill("ABM", -5, 2_000);
        assert_eq!(h.position("ABM"), -5);
        assert_eq!(h.cash(), 10_000);
    }

    #[test]
    fn test_mark_to_market_and_at_risk() {
        let mut h = Holdings::with_cash(50_000);
        h.apply_fill("ABM", 20, 1_000); // cash now 30_000

        let mut prices = BTreeMap::new();
        prices.insert("ABM".to_string(), 1_500);

        assert_eq!(h.mark_to_market(&prices), Some(30_000 + 20 * 1_500));
        assert_eq!(h.at_risk(&prices), Some(30_000));
    }

    #[test]
    fn test_mark_to_market_missing_price() {
        let mut h = Holdings::with_cash(0);
        h.apply_fill("XYZ", 1, 100);
        assert_eq!(h.mark_to_market(&BTreeMap::new()), None);
    }

    #[test]
    fn test_with_position_leaves_original_unchanged() {
        let h = Holdings::with_cash(0);
        let hypo = h.with_position("ABM", 3);
        assert_eq!(h.position("ABM"), 0);
        assert_eq!(hypo.position("ABM"), 3);
        assert_eq!(hypo.cash(), h.cash());
    }

    #[test]
    fn test_display() {
        let mut h = Holdings::with_cash(9_900);
        h.apply_fill("ABM", 30, 0);
        assert_eq!(h.to_string(), "{ ABM: 30, CASH: $99.00 }");
    }
}
