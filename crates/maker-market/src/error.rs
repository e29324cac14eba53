//! Error types for maker-market.

use thiserror::Error;

/// Market data layer errors.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("exchange call failed: {0}")]
    Exchange(#[from] maker_exchange::ExchangeError),

    #[error("bridge failure: {0}")]
    Bridge(#[from] maker_exchange::BridgeError),

    #[error("corrupt order book for {market}: {state}")]
    CorruptBook { market: String, state: String },

    #[error("no order book available for {market} (fetch failed, nothing cached)")]
    NoBookAvailable {
        market: String,
        #[source]
        source: Box<MarketError>,
    },
}

/// Result type alias for market operations.
pub type MarketResult<T> = std::result::Result<T, MarketError>;
