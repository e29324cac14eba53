//! Market layer configuration.
//!
//! Every threshold here is deployment-tunable; nothing in the classifier
//! or pricer hard-codes a constant. Defaults follow the values the
//! engine has been run with in production.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Liquidity tier thresholds.
///
/// Tiers are assigned first-match, High before Medium; anything else is
/// Low. Spread thresholds are relative (`(ask - bid) / bid`), depth
/// thresholds are notional over the top `depth_levels` levels per side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityConfig {
    /// Relative spread below which a book can classify High.
    #[serde(default = "default_spread_high")]
    pub spread_high: Decimal,
    /// Relative spread below which a book can classify Medium.
    #[serde(default = "default_spread_medium")]
    pub spread_medium: Decimal,
    /// Notional depth above which a book can classify High.
    #[serde(default = "default_depth_high")]
    pub depth_high: Decimal,
    /// Notional depth above which a book can classify Medium.
    #[serde(default = "default_depth_medium")]
    pub depth_medium: Decimal,
    /// Number of levels per side summed into the depth figure.
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,
}

fn default_spread_high() -> Decimal {
    dec!(0.001)
}

fn default_spread_medium() -> Decimal {
    dec!(0.005)
}

fn default_depth_high() -> Decimal {
    dec!(50000)
}

fn default_depth_medium() -> Decimal {
    dec!(10000)
}

fn default_depth_levels() -> usize {
    10
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            spread_high: default_spread_high(),
            spread_medium: default_spread_medium(),
            depth_high: default_depth_high(),
            depth_medium: default_depth_medium(),
            depth_levels: default_depth_levels(),
        }
    }
}

/// Maker offset per liquidity tier, as a fraction of the touch price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTable {
    #[serde(default = "default_offset_high")]
    pub high: Decimal,
    #[serde(default = "default_offset_medium")]
    pub medium: Decimal,
    #[serde(default = "default_offset_low")]
    pub low: Decimal,
    /// Per-retry linear escalation: effective = base * (1 + attempt * escalation).
    #[serde(default = "default_escalation")]
    pub escalation_per_retry: Decimal,
    /// Hard cap on the effective offset after escalation.
    #[serde(default = "default_max_offset")]
    pub max_offset: Decimal,
}

fn default_offset_high() -> Decimal {
    dec!(0.0002)
}

fn default_offset_medium() -> Decimal {
    dec!(0.0005)
}

fn default_offset_low() -> Decimal {
    dec!(0.001)
}

fn default_escalation() -> Decimal {
    dec!(0.5)
}

fn default_max_offset() -> Decimal {
    dec!(0.005)
}

impl Default for OffsetTable {
    fn default() -> Self {
        Self {
            high: default_offset_high(),
            medium: default_offset_medium(),
            low: default_offset_low(),
            escalation_per_retry: default_escalation(),
            max_offset: default_max_offset(),
        }
    }
}

impl OffsetTable {
    /// Base offset for a tier.
    pub fn base(&self, tier: maker_core::LiquidityTier) -> Decimal {
        match tier {
            maker_core::LiquidityTier::High => self.high,
            maker_core::LiquidityTier::Medium => self.medium,
            maker_core::LiquidityTier::Low => self.low,
        }
    }
}

/// Aggregated market layer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default)]
    pub liquidity: LiquidityConfig,
    #[serde(default)]
    pub offsets: OffsetTable,
    /// Order book cache TTL in milliseconds.
    #[serde(default = "default_book_ttl_ms")]
    pub book_ttl_ms: u64,
    /// Levels per side requested from the exchange.
    #[serde(default = "default_book_depth")]
    pub book_depth: usize,
}

fn default_book_ttl_ms() -> u64 {
    30_000
}

fn default_book_depth() -> usize {
    10
}
