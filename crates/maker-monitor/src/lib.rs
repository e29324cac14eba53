//! Shared order timeout monitor.
//!
//! One long-lived service polls every watched order in batches and
//! guarantees at-most-once timeout delivery. Independent trading
//! subsystems register orders here instead of each running their own
//! polling loop, which both cuts API traffic and concentrates the
//! timeout/cancel race handling in one place.

pub mod monitor;

pub use monitor::{
    MonitorConfig, OrderMonitor, PendingInfo, TimedOutOrder, WatchEvent, WatchRequest,
};
