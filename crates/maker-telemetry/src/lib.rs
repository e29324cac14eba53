//! Structured logging for the maker engine.
//!
//! JSON output in production, pretty output in development. Every
//! placement, retry and cancellation is logged with structured fields,
//! so log aggregation can slice by market, side, tier or error code.

pub mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
