//! Smart maker order placement.
//!
//! The engine places orders as makers at a liquidity-adapted price,
//! watches them through the shared monitor, and escalates through
//! cancel/replace retries (and an optional taker fallback) until the
//! order fills or the budget runs out. All shared services are injected
//! at construction; the placer owns no network or cache state itself.

pub mod config;
pub mod placer;

pub use config::{PlaceOptions, PlacerConfig, SegmentPolicy};
pub use placer::SmartOrderPlacer;
