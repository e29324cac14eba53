//! Placement engine configuration.
//!
//! Retry cadence differs per market segment: spot books are thinner and
//! more volatile, so spot placements use more attempts with a shorter
//! per-attempt wait than perpetuals.

use maker_core::MarketSegment;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Retry cadence for one market segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPolicy {
    /// Maximum maker attempts before fallback-or-fail.
    #[serde(default = "default_perp_retries")]
    pub max_retries: u32,
    /// Wall-clock deadline per attempt in milliseconds.
    #[serde(default = "default_perp_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_perp_retries() -> u32 {
    3
}

fn default_perp_timeout_ms() -> u64 {
    2_000
}

fn default_spot_policy() -> SegmentPolicy {
    SegmentPolicy {
        max_retries: 8,
        attempt_timeout_ms: 1_000,
    }
}

fn default_perp_policy() -> SegmentPolicy {
    SegmentPolicy {
        max_retries: default_perp_retries(),
        attempt_timeout_ms: default_perp_timeout_ms(),
    }
}

fn default_transient_retry_limit() -> u32 {
    3
}

fn default_transient_backoff_ms() -> u64 {
    250
}

fn default_fallback_slippage() -> Decimal {
    dec!(0.001)
}

/// Engine-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacerConfig {
    #[serde(default = "default_perp_policy")]
    pub perpetual: SegmentPolicy,
    #[serde(default = "default_perp_policy")]
    pub inverse: SegmentPolicy,
    #[serde(default = "default_spot_policy")]
    pub spot: SegmentPolicy,
    /// Transient-error resubmissions per attempt; these back off and do
    /// not consume maker retries.
    #[serde(default = "default_transient_retry_limit")]
    pub transient_retry_limit: u32,
    /// Base backoff between transient resubmissions, doubled each time.
    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_ms: u64,
    /// Price slippage allowance for the taker fallback, as a fraction of
    /// the opposite touch.
    #[serde(default = "default_fallback_slippage")]
    pub fallback_slippage: Decimal,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            perpetual: default_perp_policy(),
            inverse: default_perp_policy(),
            spot: default_spot_policy(),
            transient_retry_limit: default_transient_retry_limit(),
            transient_backoff_ms: default_transient_backoff_ms(),
            fallback_slippage: default_fallback_slippage(),
        }
    }
}

impl PlacerConfig {
    /// Cadence for a segment.
    pub fn policy(&self, segment: MarketSegment) -> SegmentPolicy {
        match segment {
            MarketSegment::Perpetual => self.perpetual,
            MarketSegment::Inverse => self.inverse,
            MarketSegment::Spot => self.spot,
        }
    }
}

/// Per-call overrides supplied by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaceOptions {
    /// Override the segment's maker retry budget.
    pub max_retries: Option<u32>,
    /// Override the segment's per-attempt deadline.
    pub attempt_timeout_ms: Option<u64>,
    /// Submit an aggressive taker order for the remainder once the maker
    /// budget is exhausted.
    pub allow_taker_fallback: bool,
}

impl PlaceOptions {
    pub fn with_taker_fallback(mut self) -> Self {
        self.allow_taker_fallback = true;
        self
    }
}
