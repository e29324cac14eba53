//! Liquidity classification of an order book snapshot.
//!
//! Pure function of (relative spread, notional depth): identical
//! snapshots always classify identically. A one-sided or empty book can
//! never support a tight maker quote, so it classifies Low with a
//! diagnostic rather than raising.

use maker_core::{LiquidityTier, OrderBookSnapshot};
use tracing::warn;

use crate::config::LiquidityConfig;

/// Classifies order books into liquidity tiers.
#[derive(Debug, Clone)]
pub struct LiquidityClassifier {
    config: LiquidityConfig,
}

impl LiquidityClassifier {
    pub fn new(config: LiquidityConfig) -> Self {
        Self { config }
    }

    /// Classify a snapshot. First match wins, High before Medium.
    pub fn classify(&self, snapshot: &OrderBookSnapshot) -> LiquidityTier {
        let state = snapshot.state();
        if !state.is_priceable() {
            warn!(market = %snapshot.market, %state, "unpriceable book, classifying Low");
            return LiquidityTier::Low;
        }

        // A valid book always has both touches.
        let Some(spread) = snapshot.relative_spread() else {
            return LiquidityTier::Low;
        };
        let depth = snapshot.depth_notional(self.config.depth_levels);

        if spread < self.config.spread_high && depth > self.config.depth_high {
            LiquidityTier::High
        } else if spread < self.config.spread_medium && depth > self.config.depth_medium {
            LiquidityTier::Medium
        } else {
            LiquidityTier::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maker_core::{BookLevel, MarketKey, MarketSegment, Price, Qty};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn book(bid: Decimal, ask: Decimal, size_per_level: Decimal, levels: usize) -> OrderBookSnapshot {
        let bids = (0..levels)
            .map(|i| {
                BookLevel::new(
                    Price::new(bid - Decimal::from(i as u64) * dec!(0.01)),
                    Qty::new(size_per_level),
                )
            })
            .collect();
        let asks = (0..levels)
            .map(|i| {
                BookLevel::new(
                    Price::new(ask + Decimal::from(i as u64) * dec!(0.01)),
                    Qty::new(size_per_level),
                )
            })
            .collect();
        OrderBookSnapshot::new(MarketKey::new("BTCUSDT", MarketSegment::Perpetual), bids, asks)
    }

    fn classifier() -> LiquidityClassifier {
        LiquidityClassifier::new(LiquidityConfig::default())
    }

    #[test]
    fn test_tight_deep_book_is_high() {
        // Spread 1/50000 = 0.002%, depth ~ 20 levels * 50k * 0.1 = 100k notional.
        let book = book(dec!(50000), dec!(50001), dec!(0.1), 10);
        assert_eq!(classifier().classify(&book), LiquidityTier::High);
    }

    #[test]
    fn test_moderate_book_is_medium() {
        // Spread 0.2%, deep enough for Medium but spread too wide for High.
        let book = book(dec!(100), dec!(100.2), dec!(100), 10);
        assert_eq!(classifier().classify(&book), LiquidityTier::Medium);
    }

    #[test]
    fn test_thin_book_is_low() {
        // Tight spread but almost no depth.
        let book = book(dec!(100), dec!(100.01), dec!(0.1), 2);
        assert_eq!(classifier().classify(&book), LiquidityTier::Low);
    }

    #[test]
    fn test_wide_spread_is_low() {
        let book = book(dec!(100), dec!(102), dec!(1000), 10);
        assert_eq!(classifier().classify(&book), LiquidityTier::Low);
    }

    #[test]
    fn test_one_sided_book_is_low_without_panic() {
        let market = MarketKey::new("XUSDT", MarketSegment::Spot);
        let no_ask = OrderBookSnapshot::new(
            market.clone(),
            vec![BookLevel::new(Price::new(dec!(10)), Qty::new(dec!(1)))],
            vec![],
        );
        assert_eq!(classifier().classify(&no_ask), LiquidityTier::Low);

        let empty = OrderBookSnapshot::new(market, vec![], vec![]);
        assert_eq!(classifier().classify(&empty), LiquidityTier::Low);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        let book = book(dec!(50000), dec!(50001), dec!(0.1), 10);
        let first = c.classify(&book);
        for _ in 0..10 {
            assert_eq!(c.classify(&book), first);
        }
    }
}
