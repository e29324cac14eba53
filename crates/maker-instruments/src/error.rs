//! Error types for maker-instruments.

use thiserror::Error;

/// Instrument rules errors.
#[derive(Debug, Error)]
pub enum InstrumentsError {
    #[error("exchange call failed: {0}")]
    Exchange(#[from] maker_exchange::ExchangeError),

    #[error("bridge failure: {0}")]
    Bridge(#[from] maker_exchange::BridgeError),

    #[error("invalid instrument metadata for {market}: {detail}")]
    InvalidMetadata { market: String, detail: String },
}

/// Result type alias for instrument operations.
pub type InstrumentsResult<T> = std::result::Result<T, InstrumentsError>;
