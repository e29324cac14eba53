//! The synchronous exchange client trait.
//!
//! The real SDK implementation lives outside this workspace; the engine
//! only depends on this boundary. Every method blocks, so callers must
//! go through the [`crate::ConcurrencyBridge`] and never invoke these
//! from an async context directly.

use maker_core::{MarketKey, OrderBookSnapshot, OrderId, OrderLinkId, OrderSide, Price, Qty};
use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;

/// Instrument metadata used to round and validate requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// Minimum price increment.
    pub tick_size: Price,
    /// Minimum quantity increment.
    pub qty_step: Qty,
    /// Minimum order quantity.
    pub min_qty: Qty,
    /// Minimum acceptable price * quantity.
    pub min_notional: rust_decimal::Decimal,
}

/// Order submission parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub market: MarketKey,
    pub side: OrderSide,
    pub qty: Qty,
    pub price: Price,
    /// Post-only orders are rejected rather than converted if they would
    /// execute as taker. Cleared only for the fallback path.
    pub post_only: bool,
    pub link_id: OrderLinkId,
}

/// Exchange-reported order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// Order status with cumulative fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub kind: StatusKind,
    pub cum_filled: Qty,
}

impl OrderStatus {
    pub fn new(kind: StatusKind, cum_filled: Qty) -> Self {
        Self { kind, cum_filled }
    }

    /// Still resting on the book (may fill or be cancelled).
    pub fn is_open(&self) -> bool {
        matches!(self.kind, StatusKind::New | StatusKind::PartiallyFilled)
    }

    pub fn is_filled(&self) -> bool {
        self.kind == StatusKind::Filled
    }
}

/// Synchronous exchange client boundary.
///
/// All methods may return structured errors carrying an exchange error
/// code; see [`crate::ExchangeError`] for the classification the engine
/// applies.
pub trait ExchangeClient: Send + Sync {
    /// Fetch an order book snapshot, `depth` levels per side.
    fn get_order_book(&self, market: &MarketKey, depth: usize) -> ExchangeResult<OrderBookSnapshot>;

    /// Submit an order. Returns the exchange-assigned id on acceptance.
    fn place_order(&self, order: &NewOrder) -> ExchangeResult<OrderId>;

    /// Cancel an open order.
    fn cancel_order(&self, market: &MarketKey, order_id: &OrderId) -> ExchangeResult<()>;

    /// Query a single order's status.
    fn get_order_status(&self, market: &MarketKey, order_id: &OrderId)
        -> ExchangeResult<OrderStatus>;

    /// Query several orders in one pass. The default implementation falls
    /// back to per-order queries; real clients should batch.
    fn get_order_statuses(
        &self,
        orders: &[(MarketKey, OrderId)],
    ) -> Vec<(OrderId, ExchangeResult<OrderStatus>)> {
        orders
            .iter()
            .map(|(market, id)| (id.clone(), self.get_order_status(market, id)))
            .collect()
    }

    /// Fetch instrument precision metadata.
    fn get_instrument_info(&self, market: &MarketKey) -> ExchangeResult<InstrumentInfo>;
}
