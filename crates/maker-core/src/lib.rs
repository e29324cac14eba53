//! Core domain types for the smart maker order engine.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Price`, `Qty`: precision-safe numeric types
//! - `MarketKey`, `MarketSegment`: market identification
//! - `OrderBookSnapshot`, `LiquidityTier`: market data
//! - `OrderRequest`, `PendingOrder`, `OrderResult`: order lifecycle

pub mod book;
pub mod decimal;
pub mod error;
pub mod order;

pub use book::{BookLevel, BookState, LiquidityTier, OrderBookSnapshot};
pub use decimal::{Price, Qty};
pub use error::{CoreError, CoreResult};
pub use order::{
    FailureReason, MarketKey, MarketSegment, OrderFailure, OrderId, OrderLinkId, OrderRequest,
    OrderResult, OrderSide, OrderState, PendingOrder,
};
