//! The monitor service: registration, batched polling, timeout delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use maker_core::{MarketKey, OrderId, OrderSide, Price, Qty};
use maker_exchange::{ConcurrencyBridge, ExchangeClient, RateLimiter, StatusKind};

/// Monitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MonitorConfig {
    /// Status poll cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Minimum spacing of summary log lines in milliseconds.
    #[serde(default = "default_summary_interval_ms")]
    pub summary_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_summary_interval_ms() -> u64 {
    60_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            summary_interval_ms: default_summary_interval_ms(),
        }
    }
}

/// Terminal outcome delivered to the watcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchEvent {
    /// The order filled completely.
    Filled { cum_filled: Qty },
    /// The deadline elapsed while the order was still open. Carries the
    /// last observed cumulative fill so callers can size a replacement.
    TimedOut { last_filled: Qty },
    /// The exchange reports the order cancelled or rejected outside this
    /// monitor's control. Carries the cumulative fill the closed status
    /// reported.
    Cancelled { last_filled: Qty },
}

/// Snapshot of a timed-out order handed to the timeout callback.
#[derive(Debug, Clone)]
pub struct TimedOutOrder {
    pub order_id: OrderId,
    pub market: MarketKey,
    pub side: OrderSide,
    pub qty: Qty,
    pub price: Price,
}

type TimeoutFn = Box<dyn FnOnce(TimedOutOrder) + Send + Sync + 'static>;

/// Registration request for one order.
pub struct WatchRequest {
    pub order_id: OrderId,
    pub market: MarketKey,
    pub side: OrderSide,
    pub qty: Qty,
    pub price: Price,
    /// Wall-clock deadline after which the order counts as timed out.
    pub deadline: Instant,
    /// Fired at most once, only if the deadline elapses while open.
    pub on_timeout: Option<TimeoutFn>,
}

impl WatchRequest {
    pub fn new(
        order_id: OrderId,
        market: MarketKey,
        side: OrderSide,
        qty: Qty,
        price: Price,
        deadline: Instant,
    ) -> Self {
        Self {
            order_id,
            market,
            side,
            qty,
            price,
            deadline,
            on_timeout: None,
        }
    }

    pub fn with_on_timeout(
        mut self,
        f: impl FnOnce(TimedOutOrder) + Send + Sync + 'static,
    ) -> Self {
        self.on_timeout = Some(Box::new(f));
        self
    }
}

/// Introspection entry for display subsystems.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PendingInfo {
    pub order_id: String,
    pub market: String,
    pub side: String,
    pub qty: Qty,
    pub price: Price,
    pub remaining_ms: u64,
    pub expired: bool,
}

struct Watched {
    market: MarketKey,
    side: OrderSide,
    qty: Qty,
    price: Price,
    deadline: Instant,
    last_filled: Qty,
    on_timeout: Option<TimeoutFn>,
    event_tx: oneshot::Sender<WatchEvent>,
}

/// Shared order timeout monitor. Construct once, inject everywhere.
pub struct OrderMonitor {
    client: Arc<dyn ExchangeClient>,
    bridge: ConcurrencyBridge,
    limiter: Arc<RateLimiter>,
    config: MonitorConfig,
    watched: DashMap<OrderId, Watched>,
    last_summary: Mutex<Instant>,
}

impl OrderMonitor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        bridge: ConcurrencyBridge,
        limiter: Arc<RateLimiter>,
        config: MonitorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            bridge,
            limiter,
            config,
            watched: DashMap::new(),
            last_summary: Mutex::new(Instant::now()),
        })
    }

    /// Start the polling loop. Call once; the returned handle owns the
    /// task and aborts it when dropped by the host.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(monitor.config.poll_interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                monitor.poll_once().await;
            }
        })
    }

    /// Register an order. The receiver resolves exactly once with the
    /// terminal event; it errors if the order is unwatched first.
    pub fn watch(&self, request: WatchRequest) -> oneshot::Receiver<WatchEvent> {
        let (event_tx, event_rx) = oneshot::channel();
        info!(
            order_id = %request.order_id,
            market = %request.market,
            side = %request.side,
            qty = %request.qty,
            price = %request.price,
            timeout_ms = request.deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
            "order registered with monitor"
        );
        self.watched.insert(
            request.order_id,
            Watched {
                market: request.market,
                side: request.side,
                qty: request.qty,
                price: request.price,
                deadline: request.deadline,
                last_filled: Qty::ZERO,
                on_timeout: request.on_timeout,
                event_tx,
            },
        );
        event_rx
    }

    /// Remove an order from watching (fill notification or explicit
    /// cancel). Returns false if it was already resolved.
    pub fn unwatch(&self, order_id: &OrderId) -> bool {
        let removed = self.watched.remove(order_id).is_some();
        if removed {
            debug!(order_id = %order_id, "order unwatched");
        }
        removed
    }

    /// Number of orders currently watched.
    pub fn pending_count(&self) -> usize {
        self.watched.len()
    }

    /// Introspection snapshot for display subsystems.
    pub fn pending_info(&self) -> Vec<PendingInfo> {
        let now = Instant::now();
        self.watched
            .iter()
            .map(|entry| PendingInfo {
                order_id: entry.key().to_string(),
                market: entry.market.to_string(),
                side: entry.side.to_string(),
                qty: entry.qty,
                price: entry.price,
                remaining_ms: entry.deadline.saturating_duration_since(now).as_millis() as u64,
                expired: now >= entry.deadline,
            })
            .collect()
    }

    /// One polling pass: batch-query every watched order, resolve fills
    /// and expiries. Removal from the map is the exactly-once gate; a
    /// concurrent `unwatch` and a timeout can never both resolve.
    async fn poll_once(&self) {
        if self.watched.is_empty() {
            return;
        }
        self.log_summary();

        let batch: Vec<(MarketKey, OrderId)> = self
            .watched
            .iter()
            .map(|entry| (entry.market.clone(), entry.key().clone()))
            .collect();

        self.limiter.acquire().await;
        let client = self.client.clone();
        let query = batch.clone();
        let statuses = match self.bridge.run(move || client.get_order_statuses(&query)).await {
            Ok(statuses) => statuses,
            Err(err) => {
                warn!(error = %err, "monitor status batch failed");
                return;
            }
        };

        let now = Instant::now();
        for (order_id, status) in statuses {
            match status {
                Ok(status) if status.is_filled() => {
                    if let Some((_, watched)) = self.watched.remove(&order_id) {
                        info!(order_id = %order_id, market = %watched.market, "watched order filled");
                        let _ = watched.event_tx.send(WatchEvent::Filled {
                            cum_filled: status.cum_filled,
                        });
                    }
                }
                Ok(status) if !status.is_open() => {
                    if let Some((_, watched)) = self.watched.remove(&order_id) {
                        warn!(order_id = %order_id, market = %watched.market, "watched order cancelled externally");
                        let _ = watched.event_tx.send(WatchEvent::Cancelled {
                            last_filled: status.cum_filled,
                        });
                    }
                }
                Ok(status) => {
                    // Still open: refresh the partial fill, then check the
                    // deadline.
                    if let Some(mut entry) = self.watched.get_mut(&order_id) {
                        entry.last_filled = status.cum_filled;
                    }
                    self.expire_if_due(&order_id, now);
                }
                Err(err) => {
                    warn!(order_id = %order_id, error = %err, "status query failed");
                    // The deadline is wall-clock, not best-effort: expire
                    // even when the status is unknown. Callers re-check
                    // state on the cancel path.
                    self.expire_if_due(&order_id, now);
                }
            }
        }
    }

    fn expire_if_due(&self, order_id: &OrderId, now: Instant) {
        let due = self
            .watched
            .get(order_id)
            .map(|w| now >= w.deadline)
            .unwrap_or(false);
        if !due {
            return;
        }
        if let Some((id, watched)) = self.watched.remove(order_id) {
            warn!(
                order_id = %id,
                market = %watched.market,
                side = %watched.side,
                price = %watched.price,
                "order deadline elapsed"
            );
            let _ = watched.event_tx.send(WatchEvent::TimedOut {
                last_filled: watched.last_filled,
            });
            if let Some(on_timeout) = watched.on_timeout {
                on_timeout(TimedOutOrder {
                    order_id: id,
                    market: watched.market,
                    side: watched.side,
                    qty: watched.qty,
                    price: watched.price,
                });
            }
        }
    }

    fn log_summary(&self) {
        let mut last = self.last_summary.lock();
        if last.elapsed() < Duration::from_millis(self.config.summary_interval_ms) {
            return;
        }
        *last = Instant::now();
        let now = Instant::now();
        let expired = self
            .watched
            .iter()
            .filter(|entry| now >= entry.deadline)
            .count();
        info!(pending = self.watched.len(), expired, "monitor summary");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maker_core::{MarketSegment, OrderBookSnapshot};
    use maker_exchange::{
        ExchangeError, ExchangeResult, InstrumentInfo, NewOrder, OrderStatus, RateLimitConfig,
    };
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    struct ScriptedStatuses {
        statuses: Mutex<HashMap<OrderId, OrderStatus>>,
        batch_calls: AtomicUsize,
    }

    impl ScriptedStatuses {
        fn new() -> Self {
            Self {
                statuses: Mutex::new(HashMap::new()),
                batch_calls: AtomicUsize::new(0),
            }
        }

        fn set(&self, id: &OrderId, kind: StatusKind, filled: Qty) {
            self.statuses
                .lock()
                .insert(id.clone(), OrderStatus::new(kind, filled));
        }
    }

    impl ExchangeClient for ScriptedStatuses {
        fn get_order_book(
            &self,
            _market: &MarketKey,
            _depth: usize,
        ) -> ExchangeResult<OrderBookSnapshot> {
            Err(ExchangeError::Timeout)
        }

        fn place_order(&self, _order: &NewOrder) -> ExchangeResult<OrderId> {
            Err(ExchangeError::Timeout)
        }

        fn cancel_order(&self, _market: &MarketKey, _order_id: &OrderId) -> ExchangeResult<()> {
            Ok(())
        }

        fn get_order_status(
            &self,
            _market: &MarketKey,
            order_id: &OrderId,
        ) -> ExchangeResult<OrderStatus> {
            self.statuses
                .lock()
                .get(order_id)
                .copied()
                .ok_or_else(|| ExchangeError::api(110001, "order not exists"))
        }

        fn get_order_statuses(
            &self,
            orders: &[(MarketKey, OrderId)],
        ) -> Vec<(OrderId, ExchangeResult<OrderStatus>)> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            orders
                .iter()
                .map(|(market, id)| (id.clone(), self.get_order_status(market, id)))
                .collect()
        }

        fn get_instrument_info(&self, _market: &MarketKey) -> ExchangeResult<InstrumentInfo> {
            Err(ExchangeError::Timeout)
        }
    }

    fn monitor_with(exchange: Arc<ScriptedStatuses>, poll_ms: u64) -> Arc<OrderMonitor> {
        OrderMonitor::new(
            exchange,
            ConcurrencyBridge::new(2),
            Arc::new(RateLimiter::new(RateLimitConfig {
                max_calls: 10_000,
                window_ms: 1000,
            })),
            MonitorConfig {
                poll_interval_ms: poll_ms,
                summary_interval_ms: 60_000,
            },
        )
    }

    fn market() -> MarketKey {
        MarketKey::new("BTCUSDT", MarketSegment::Perpetual)
    }

    fn request(id: &OrderId, deadline: Instant) -> WatchRequest {
        WatchRequest::new(
            id.clone(),
            market(),
            OrderSide::Buy,
            Qty::new(dec!(0.001)),
            Price::new(dec!(50000)),
            deadline,
        )
    }

    #[tokio::test]
    async fn test_fill_resolves_watch() {
        let exchange = Arc::new(ScriptedStatuses::new());
        let id = OrderId::new("o1");
        exchange.set(&id, StatusKind::Filled, Qty::new(dec!(0.001)));

        let monitor = monitor_with(exchange, 10);
        let handle = monitor.spawn();
        let rx = monitor.watch(request(&id, Instant::now() + Duration::from_secs(5)));

        let event = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert_eq!(
            event,
            WatchEvent::Filled {
                cum_filled: Qty::new(dec!(0.001))
            }
        );
        assert_eq!(monitor.pending_count(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_timeout_fires_exactly_once() {
        let exchange = Arc::new(ScriptedStatuses::new());
        let id = OrderId::new("o2");
        exchange.set(&id, StatusKind::New, Qty::ZERO);

        let monitor = monitor_with(exchange, 10);
        let handle = monitor.spawn();

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        let rx = monitor.watch(
            request(&id, Instant::now() + Duration::from_millis(30))
                .with_on_timeout(move |_| {
                    fired_cb.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let event = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert!(matches!(event, WatchEvent::TimedOut { .. }));

        // Let several more polls run; the callback must not re-fire.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.pending_count(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_unwatch_prevents_timeout() {
        let exchange = Arc::new(ScriptedStatuses::new());
        let id = OrderId::new("o3");
        exchange.set(&id, StatusKind::New, Qty::ZERO);

        let monitor = monitor_with(exchange, 10);
        let handle = monitor.spawn();

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        let rx = monitor.watch(
            request(&id, Instant::now() + Duration::from_millis(30))
                .with_on_timeout(move |_| {
                    fired_cb.fetch_add(1, Ordering::SeqCst);
                }),
        );

        assert!(monitor.unwatch(&id));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // Receiver resolves with an error, not an event.
        assert!(rx.await.is_err());
        handle.abort();
    }

    #[tokio::test]
    async fn test_partial_fill_then_timeout_reports_last_filled() {
        let exchange = Arc::new(ScriptedStatuses::new());
        let id = OrderId::new("o4");
        exchange.set(&id, StatusKind::PartiallyFilled, Qty::new(dec!(0.0004)));

        let monitor = monitor_with(exchange, 10);
        let handle = monitor.spawn();
        let rx = monitor.watch(request(&id, Instant::now() + Duration::from_millis(50)));

        let event = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert_eq!(
            event,
            WatchEvent::TimedOut {
                last_filled: Qty::new(dec!(0.0004))
            }
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_many_orders_share_one_batch_per_poll() {
        let exchange = Arc::new(ScriptedStatuses::new());
        let monitor = monitor_with(exchange.clone(), 20);

        let ids: Vec<OrderId> = (0..5).map(|i| OrderId::new(format!("b{i}"))).collect();
        for id in &ids {
            exchange.set(id, StatusKind::New, Qty::ZERO);
            let _rx = monitor.watch(request(id, Instant::now() + Duration::from_secs(5)));
        }

        monitor.poll_once().await;
        assert_eq!(exchange.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.pending_count(), 5);
    }

    #[tokio::test]
    async fn test_external_cancel_resolves_cancelled_with_fill() {
        let exchange = Arc::new(ScriptedStatuses::new());
        let id = OrderId::new("o5");
        // Cancelled after a partial execution; the fill must travel with
        // the event so callers can size a replacement.
        exchange.set(&id, StatusKind::Cancelled, Qty::new(dec!(0.0002)));

        let monitor = monitor_with(exchange, 10);
        let handle = monitor.spawn();
        let rx = monitor.watch(request(&id, Instant::now() + Duration::from_secs(5)));

        let event = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert_eq!(
            event,
            WatchEvent::Cancelled {
                last_filled: Qty::new(dec!(0.0002))
            }
        );
        handle.abort();
    }
}
