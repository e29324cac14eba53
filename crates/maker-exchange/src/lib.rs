//! Exchange client boundary for the smart maker order engine.
//!
//! The exchange SDK is synchronous and blocking. This crate defines the
//! trait the rest of the engine programs against, the structured error
//! taxonomy for exchange responses, and the two pieces of plumbing that
//! make blocking calls safe under cooperative scheduling:
//!
//! - [`RateLimiter`]: sliding-window admission shared per endpoint class,
//!   with both suspending and thread-blocking acquisition.
//! - [`ConcurrencyBridge`]: a semaphore-bounded `spawn_blocking` pool so
//!   blocking SDK calls never stall the async scheduler.

pub mod bridge;
pub mod client;
pub mod error;
pub mod rate_limiter;

pub use bridge::{BridgeError, BridgeResult, ConcurrencyBridge};
pub use client::{ExchangeClient, InstrumentInfo, NewOrder, OrderStatus, StatusKind};
pub use error::{ExchangeError, ExchangeResult};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
