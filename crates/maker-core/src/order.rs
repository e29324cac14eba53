//! Order identification and lifecycle types.
//!
//! A `PendingOrder` tracks a single maker attempt from submission to a
//! terminal state. Exactly one active pending order may exist per
//! `MarketKey` + side under the engine's management; the placer enforces
//! this with an exposure guard keyed on (symbol, side, segment).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::book::LiquidityTier;
use crate::decimal::{Price, Qty};
use crate::error::CoreError;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Market segment an instrument trades in.
///
/// Retry budgets and attempt cadence differ per segment: spot books are
/// thinner and more volatile, so spot uses more retries with a shorter
/// per-attempt wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSegment {
    Perpetual,
    Inverse,
    Spot,
}

impl fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Perpetual => write!(f, "perpetual"),
            Self::Inverse => write!(f, "inverse"),
            Self::Spot => write!(f, "spot"),
        }
    }
}

impl FromStr for MarketSegment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perpetual" => Ok(Self::Perpetual),
            "inverse" => Ok(Self::Inverse),
            "spot" => Ok(Self::Spot),
            other => Err(CoreError::InvalidMarketKey(other.to_string())),
        }
    }
}

/// Unique market identifier: symbol + segment.
///
/// The same symbol can trade in several segments with different
/// precision rules, so both parts are required for cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub symbol: String,
    pub segment: MarketSegment,
}

impl MarketKey {
    pub fn new(symbol: impl Into<String>, segment: MarketSegment) -> Self {
        Self {
            symbol: symbol.into(),
            segment,
        }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.segment)
    }
}

impl FromStr for MarketKey {
    type Err = CoreError;

    /// Parse the `SYMBOL:segment` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (symbol, segment) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidMarketKey(s.to_string()))?;
        if symbol.is_empty() {
            return Err(CoreError::InvalidMarketKey(s.to_string()));
        }
        Ok(Self::new(symbol, segment.parse()?))
    }
}

/// Exchange-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied correlation id for idempotency and log correlation.
///
/// Format: `mkr_{timestamp_ms}_{uuid_short}` when generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderLinkId(String);

impl OrderLinkId {
    /// Create a new unique link id.
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("mkr_{ts}_{uuid_short}"))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderLinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderLinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A desired trade, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: MarketKey,
    pub side: OrderSide,
    pub qty: Qty,
    /// Correlation id; generated if the caller does not supply one.
    pub link_id: OrderLinkId,
    /// When set, the minimum-notional fix-up must not grow the quantity
    /// beyond step rounding (hedges must match their target exactly).
    pub exact_qty: bool,
}

impl OrderRequest {
    pub fn new(market: MarketKey, side: OrderSide, qty: Qty) -> Self {
        Self {
            market,
            side,
            qty,
            link_id: OrderLinkId::new(),
            exact_qty: false,
        }
    }

    pub fn with_link_id(mut self, link_id: OrderLinkId) -> Self {
        self.link_id = link_id;
        self
    }

    pub fn with_exact_qty(mut self) -> Self {
        self.exact_qty = true;
        self
    }
}

/// Lifecycle state of a pending order.
///
/// ```text
/// Placed → Filled
/// Placed → PartiallyFilled → Filled
/// Placed → TimedOut → Cancelling → Replaced          (retry budget left)
/// Placed → TimedOut → Cancelling → FallbackPlaced    (taker fallback)
/// Placed → TimedOut → Cancelling → Failed            (budget exhausted)
/// ```
///
/// A partial execution observed while waiting moves the order through
/// `PartiallyFilled` before `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Placed,
    PartiallyFilled,
    Filled,
    TimedOut,
    Cancelling,
    Replaced,
    FallbackPlaced,
    Failed,
}

impl OrderState {
    /// Terminal states release the exposure guard.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Replaced | Self::FallbackPlaced | Self::Failed)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Placed => "placed",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::TimedOut => "timed_out",
            Self::Cancelling => "cancelling",
            Self::Replaced => "replaced",
            Self::FallbackPlaced => "fallback_placed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A live maker attempt under the engine's management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: OrderId,
    pub market: MarketKey,
    pub side: OrderSide,
    pub price: Price,
    pub qty: Qty,
    pub tier: LiquidityTier,
    /// Offset actually applied when the price was computed.
    pub applied_offset: Decimal,
    /// Zero-based attempt number this order belongs to.
    pub attempt: u32,
    pub placed_at: DateTime<Utc>,
    pub state: OrderState,
}

impl PendingOrder {
    /// Transition to a new state, enforcing that terminal states are sticky.
    pub fn transition(&mut self, next: OrderState) {
        debug_assert!(
            !self.state.is_terminal() || self.state == next,
            "transition out of terminal state {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

/// Why a placement terminated unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Invalid request (bad quantity, unknown symbol). Never retried.
    InvalidRequest,
    /// No order book could be fetched and no stale copy existed.
    MarketDataUnavailable,
    /// Transient exchange errors exhausted their backoff budget.
    ExchangeUnavailable,
    /// The exchange rejected the order for a non-recoverable reason
    /// (insufficient balance, delisting).
    NonRecoverable,
    /// A precision or minimum-notional rejection recurred after an
    /// in-place correction.
    RepeatedFormatReject,
    /// The requested exact quantity cannot satisfy the notional floor.
    NotionalConflict,
    /// All maker attempts timed out and taker fallback was not allowed.
    RetriesExhausted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::MarketDataUnavailable => "market_data_unavailable",
            Self::ExchangeUnavailable => "exchange_unavailable",
            Self::NonRecoverable => "non_recoverable",
            Self::RepeatedFormatReject => "repeated_format_reject",
            Self::NotionalConflict => "notional_conflict",
            Self::RetriesExhausted => "retries_exhausted",
        };
        write!(f, "{s}")
    }
}

/// Structured failure detail, rich enough to diagnose without logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailure {
    pub reason: FailureReason,
    /// Last exchange error code observed, if any.
    pub exchange_code: Option<i64>,
    pub message: String,
}

impl OrderFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            exchange_code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.exchange_code = Some(code);
        self
    }
}

/// Terminal output of a placement, returned exactly once per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<OrderId>,
    pub link_id: OrderLinkId,
    pub price: Option<Price>,
    pub applied_offset: Option<Decimal>,
    pub tier: Option<LiquidityTier>,
    pub retry_count: u32,
    /// True when the fill came from the aggressive taker fallback.
    pub taker_fallback: bool,
    pub elapsed_ms: u64,
    pub failure: Option<OrderFailure>,
}

impl OrderResult {
    pub fn filled(
        order_id: OrderId,
        link_id: OrderLinkId,
        price: Price,
        applied_offset: Decimal,
        tier: LiquidityTier,
        retry_count: u32,
    ) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            link_id,
            price: Some(price),
            applied_offset: Some(applied_offset),
            tier: Some(tier),
            retry_count,
            taker_fallback: false,
            elapsed_ms: 0,
            failure: None,
        }
    }

    pub fn failed(link_id: OrderLinkId, retry_count: u32, failure: OrderFailure) -> Self {
        Self {
            success: false,
            order_id: None,
            link_id,
            price: None,
            applied_offset: None,
            tier: None,
            retry_count,
            taker_fallback: false,
            elapsed_ms: 0,
            failure: Some(failure),
        }
    }
}
