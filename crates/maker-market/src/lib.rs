//! Market data layer: order book caching, liquidity classification and
//! dynamic maker pricing.
//!
//! The cache is the only component that talks to the exchange for books;
//! classifier and pricer are pure functions over snapshots so they stay
//! trivially testable and deterministic.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod pricer;

pub use cache::{BookFetch, BookSource, OrderBookCache};
pub use classifier::LiquidityClassifier;
pub use config::{LiquidityConfig, MarketConfig, OffsetTable};
pub use error::{MarketError, MarketResult};
pub use pricer::{MakerPricer, MakerQuote};
