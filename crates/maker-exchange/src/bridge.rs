//! Bounded worker pool bridging blocking exchange calls into async.
//!
//! The exchange SDK blocks on the network. Calling it from the async
//! scheduler would stall every other in-flight state machine, so each
//! call is shipped to `spawn_blocking` behind a semaphore sized to the
//! exchange's safe concurrency limit. No caller may bypass the bridge
//! for actions covered by the engine.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Bridge failure: the pool is shut down or a worker panicked.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("concurrency bridge is closed")]
    Closed,

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Semaphore-bounded executor for blocking exchange calls.
#[derive(Clone)]
pub struct ConcurrencyBridge {
    permits: Arc<Semaphore>,
}

impl ConcurrencyBridge {
    /// Create a bridge admitting at most `workers` concurrent calls.
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "bridge needs at least one worker slot");
        Self {
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Execute a blocking call off the scheduler thread and await its
    /// result. Suspends while the pool is saturated.
    pub async fn run<T, F>(&self, f: F) -> BridgeResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BridgeError::Closed)?;

        let handle = tokio::task::spawn_blocking(move || {
            let result = f();
            drop(permit);
            result
        });

        handle.await.map_err(|e| BridgeError::Worker(e.to_string()))
    }

    /// Number of currently free worker slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
