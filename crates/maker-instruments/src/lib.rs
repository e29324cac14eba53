//! Instrument precision rules: cached tick/step/min-notional metadata
//! and the rounding applied to every outgoing order.

pub mod error;
pub mod rules;

pub use error::{InstrumentsError, InstrumentsResult};
pub use rules::{ensure_maker_price, InstrumentRules, InstrumentsConfig, RoundedOrder};
