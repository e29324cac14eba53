//! Order book snapshot and liquidity tier types.
//!
//! Snapshots are owned by the book cache; consumers receive clones and
//! never mutate them. A snapshot with a crossed top of book is corrupt
//! and must be discarded at the fetch boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Price, Qty};
use crate::order::MarketKey;

/// One price level: (price, size), best-first ordering in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Qty,
}

impl BookLevel {
    pub fn new(price: Price, size: Qty) -> Self {
        Self { price, size }
    }

    /// Notional value resting at this level.
    pub fn notional(&self) -> Decimal {
        self.size.notional(self.price)
    }
}

/// Validation state of a snapshot's top of book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    /// Both sides present, best bid < best ask.
    Valid,
    /// No bid levels.
    NoBid,
    /// No ask levels.
    NoAsk,
    /// Both sides missing.
    Empty,
    /// Crossed or otherwise inconsistent (best bid >= best ask).
    Crossed,
}

impl BookState {
    /// Only a valid book can price a maker order.
    pub fn is_priceable(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for BookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Valid => "VALID",
            Self::NoBid => "NO_BID",
            Self::NoAsk => "NO_ASK",
            Self::Empty => "EMPTY",
            Self::Crossed => "CROSSED",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time order book snapshot, best-first on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub market: MarketKey,
    /// Bids sorted by price descending.
    pub bids: Vec<BookLevel>,
    /// Asks sorted by price ascending.
    pub asks: Vec<BookLevel>,
    pub captured_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn new(market: MarketKey, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        Self {
            market,
            bids,
            asks,
            captured_at: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// Relative spread: `(best_ask - best_bid) / best_bid`.
    pub fn relative_spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        ask.rel_from(bid)
    }

    /// Notional depth over the top `levels` levels, both sides summed.
    pub fn depth_notional(&self, levels: usize) -> Decimal {
        let side_sum = |side: &[BookLevel]| {
            side.iter()
                .take(levels)
                .map(BookLevel::notional)
                .sum::<Decimal>()
        };
        side_sum(&self.bids) + side_sum(&self.asks)
    }

    /// Validate the top of book.
    pub fn state(&self) -> BookState {
        let bid = self.bids.first().filter(|l| l.price.is_positive());
        let ask = self.asks.first().filter(|l| l.price.is_positive());
        match (bid, ask) {
            (None, None) => BookState::Empty,
            (Some(_), None) => BookState::NoAsk,
            (None, Some(_)) => BookState::NoBid,
            (Some(b), Some(a)) => {
                if b.price < a.price {
                    BookState::Valid
                } else {
                    BookState::Crossed
                }
            }
        }
    }

    /// Age of the snapshot in milliseconds.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.captured_at).num_milliseconds()
    }
}

/// Coarse classification of how thick and tight a book is.
///
/// Each tier maps to a maker price offset in the market configuration;
/// thin books get a wider offset to compensate for slippage risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    High,
    Medium,
    Low,
}

impl fmt::Display for LiquidityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::MarketSegment;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, size: Decimal) -> BookLevel {
        BookLevel::new(Price::new(price), Qty::new(size))
    }

    fn snapshot(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            MarketKey::new("BTCUSDT", MarketSegment::Perpetual),
            bids,
            asks,
        )
    }

    #[test]
    fn test_valid_book() {
        let book = snapshot(
            vec![level(dec!(50000), dec!(1))],
            vec![level(dec!(50001), dec!(1))],
        );
        assert_eq!(book.state(), BookState::Valid);
        assert_eq!(book.best_bid().unwrap().inner(), dec!(50000));
        assert_eq!(book.best_ask().unwrap().inner(), dec!(50001));
    }

    #[test]
    fn test_crossed_book_rejected() {
        let book = snapshot(
            vec![level(dec!(50001), dec!(1))],
            vec![level(dec!(50000), dec!(1))],
        );
        assert_eq!(book.state(), BookState::Crossed);
        assert!(!book.state().is_priceable());
    }

    #[test]
    fn test_one_sided_and_empty_books() {
        let no_ask = snapshot(vec![level(dec!(50000), dec!(1))], vec![]);
        assert_eq!(no_ask.state(), BookState::NoAsk);

        let no_bid = snapshot(vec![], vec![level(dec!(50001), dec!(1))]);
        assert_eq!(no_bid.state(), BookState::NoBid);

        let empty = snapshot(vec![], vec![]);
        assert_eq!(empty.state(), BookState::Empty);
    }

    #[test]
    fn test_relative_spread() {
        let book = snapshot(
            vec![level(dec!(50000), dec!(1))],
            vec![level(dec!(50001), dec!(1))],
        );
        assert_eq!(book.relative_spread().unwrap(), dec!(0.00002));
    }

    #[test]
    fn test_depth_notional_caps_levels() {
        let bids = (0..12)
            .map(|i| level(dec!(100) - Decimal::from(i), dec!(1)))
            .collect();
        let asks = (0..12)
            .map(|i| level(dec!(101) + Decimal::from(i), dec!(1)))
            .collect();
        let book = snapshot(bids, asks);

        // Top 10 per side only: bids 100..91, asks 101..110.
        let expected: Decimal = (91..=100).map(Decimal::from).sum::<Decimal>()
            + (101..=110).map(Decimal::from).sum::<Decimal>();
        assert_eq!(book.depth_notional(10), expected);
    }
}
