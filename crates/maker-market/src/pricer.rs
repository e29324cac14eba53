//! Dynamic maker price calculation.
//!
//! The quote leans into the spread from the touch: buys quote above the
//! best bid, sells below the best ask, with the offset sized by the
//! liquidity tier and escalated on every retry. The computed price is
//! clamped to the opposite touch so it can never cross the spread; the
//! placer nudges one tick back inside after exchange rounding.

use maker_core::{LiquidityTier, OrderBookSnapshot, OrderSide, Price};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::OffsetTable;

/// A computed maker quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakerQuote {
    /// Un-rounded limit price; tick rounding is the instrument layer's job.
    pub price: Price,
    /// Offset fraction actually applied, after escalation and capping.
    pub offset: Decimal,
}

/// Computes maker limit prices from book snapshots.
#[derive(Debug, Clone)]
pub struct MakerPricer {
    offsets: OffsetTable,
}

impl MakerPricer {
    pub fn new(offsets: OffsetTable) -> Self {
        Self { offsets }
    }

    /// Effective offset for a tier at a given zero-based retry attempt.
    ///
    /// Monotonically non-decreasing in `attempt`, capped at `max_offset`.
    pub fn effective_offset(&self, tier: LiquidityTier, attempt: u32) -> Decimal {
        let base = self.offsets.base(tier);
        let scaled =
            base * (Decimal::ONE + self.offsets.escalation_per_retry * Decimal::from(attempt));
        scaled.min(self.offsets.max_offset)
    }

    /// Compute the maker price for one attempt.
    ///
    /// Returns `None` when the book is missing a touch; callers treat that
    /// as market data unavailability, not an error to retry against.
    pub fn compute(
        &self,
        side: OrderSide,
        snapshot: &OrderBookSnapshot,
        tier: LiquidityTier,
        attempt: u32,
    ) -> Option<MakerQuote> {
        let best_bid = snapshot.best_bid()?;
        let best_ask = snapshot.best_ask()?;
        let offset = self.effective_offset(tier, attempt);

        let (price, touch) = match side {
            // Lean up from the bid, never beyond the ask.
            OrderSide::Buy => {
                let raw = best_bid * (Decimal::ONE + offset);
                (raw.min(best_ask), best_bid)
            }
            // Lean down from the ask, never beneath the bid.
            OrderSide::Sell => {
                let raw = best_ask * (Decimal::ONE - offset);
                (raw.max(best_bid), best_ask)
            }
        };

        debug!(
            market = %snapshot.market,
            %side,
            %tier,
            attempt,
            %offset,
            bid = %best_bid,
            ask = %best_ask,
            %price,
            lean_bps = %price.bps_from(touch).unwrap_or_default(),
            "maker quote computed"
        );

        Some(MakerQuote { price, offset })
    }
}
