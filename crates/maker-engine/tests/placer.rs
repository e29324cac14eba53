//! End-to-end placement scenarios against a scripted exchange.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use maker_core::{
    BookLevel, FailureReason, LiquidityTier, MarketKey, MarketSegment, OrderBookSnapshot, OrderId,
    OrderRequest, OrderSide, OrderState, Price, Qty,
};
use maker_engine::{PlaceOptions, PlacerConfig, SmartOrderPlacer};
use maker_exchange::{
    ConcurrencyBridge, ExchangeClient, ExchangeError, ExchangeResult, InstrumentInfo, NewOrder,
    OrderStatus, RateLimitConfig, RateLimiter, StatusKind,
};
use maker_instruments::{InstrumentRules, InstrumentsConfig};
use maker_market::{LiquidityClassifier, LiquidityConfig, MakerPricer, OffsetTable, OrderBookCache};
use maker_monitor::{MonitorConfig, OrderMonitor};

enum PlaceResponse {
    Accept,
    Reject(ExchangeError),
}

/// Scripted exchange double: fixed book, scripted placement responses,
/// in-memory order statuses, call counters.
struct ScriptedExchange {
    bid: Decimal,
    ask: Decimal,
    level_size: Decimal,
    info: Mutex<InstrumentInfo>,
    place_script: Mutex<VecDeque<PlaceResponse>>,
    /// Accepted orders report Filled immediately instead of resting.
    fill_on_place: AtomicBool,
    /// Cancels answer "order not exists" and the order flips to Filled,
    /// simulating a fill racing the cancel.
    cancel_races_fill: AtomicBool,
    /// One-shot: the next cancel answers "order not exists" and leaves
    /// the order cancelled with this partial execution on record.
    race_partial: Mutex<Option<Qty>>,
    statuses: Mutex<HashMap<OrderId, (OrderStatus, Qty)>>,
    placed: Mutex<Vec<NewOrder>>,
    place_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    next_id: AtomicUsize,
    open_orders: Mutex<HashMap<(String, OrderSide), i64>>,
    max_open: AtomicI64,
}

impl ScriptedExchange {
    fn btc() -> Self {
        Self::with_book(dec!(50000), dec!(50020), dec!(1), btc_info())
    }

    fn with_book(bid: Decimal, ask: Decimal, level_size: Decimal, info: InstrumentInfo) -> Self {
        Self {
            bid,
            ask,
            level_size,
            info: Mutex::new(info),
            place_script: Mutex::new(VecDeque::new()),
            fill_on_place: AtomicBool::new(false),
            cancel_races_fill: AtomicBool::new(false),
            race_partial: Mutex::new(None),
            statuses: Mutex::new(HashMap::new()),
            placed: Mutex::new(Vec::new()),
            place_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            open_orders: Mutex::new(HashMap::new()),
            max_open: AtomicI64::new(0),
        }
    }

    fn script(&self, responses: Vec<PlaceResponse>) {
        *self.place_script.lock() = responses.into();
    }

    fn set_fill_on_place(&self) {
        self.fill_on_place.store(true, Ordering::SeqCst);
    }

    fn set_cancel_races_fill(&self) {
        self.cancel_races_fill.store(true, Ordering::SeqCst);
    }

    fn set_race_partial(&self, qty: Qty) {
        *self.race_partial.lock() = Some(qty);
    }

    fn track_open(&self, order: &NewOrder, delta: i64) {
        let mut open = self.open_orders.lock();
        let count = open
            .entry((order.market.symbol.clone(), order.side))
            .or_insert(0);
        *count += delta;
        self.max_open.fetch_max(*count, Ordering::SeqCst);
    }
}

fn btc_info() -> InstrumentInfo {
    InstrumentInfo {
        tick_size: Price::new(dec!(0.5)),
        qty_step: Qty::new(dec!(0.001)),
        min_qty: Qty::new(dec!(0.001)),
        min_notional: dec!(5),
    }
}

impl ExchangeClient for ScriptedExchange {
    fn get_order_book(&self, market: &MarketKey, depth: usize) -> ExchangeResult<OrderBookSnapshot> {
        let bids = (0..depth)
            .map(|i| {
                BookLevel::new(
                    Price::new(self.bid - Decimal::from(i as u64) * dec!(0.5)),
                    Qty::new(self.level_size),
                )
            })
            .collect();
        let asks = (0..depth)
            .map(|i| {
                BookLevel::new(
                    Price::new(self.ask + Decimal::from(i as u64) * dec!(0.5)),
                    Qty::new(self.level_size),
                )
            })
            .collect();
        Ok(OrderBookSnapshot::new(market.clone(), bids, asks))
    }

    fn place_order(&self, order: &NewOrder) -> ExchangeResult<OrderId> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        self.placed.lock().push(order.clone());

        let scripted = self.place_script.lock().pop_front();
        if let Some(PlaceResponse::Reject(err)) = scripted {
            return Err(err);
        }

        let id = OrderId::new(format!("ord{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        if self.fill_on_place.load(Ordering::SeqCst) {
            self.statuses.lock().insert(
                id.clone(),
                (OrderStatus::new(StatusKind::Filled, order.qty), order.qty),
            );
        } else {
            self.statuses.lock().insert(
                id.clone(),
                (OrderStatus::new(StatusKind::New, Qty::ZERO), order.qty),
            );
            self.track_open(order, 1);
        }
        Ok(id)
    }

    fn cancel_order(&self, _market: &MarketKey, order_id: &OrderId) -> ExchangeResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock();
        let Some((status, full_qty)) = statuses.get_mut(order_id) else {
            return Err(ExchangeError::api(110001, "order not exists"));
        };

        if self.cancel_races_fill.load(Ordering::SeqCst) {
            *status = OrderStatus::new(StatusKind::Filled, *full_qty);
            return Err(ExchangeError::api(
                110001,
                "order not exists or too late to cancel",
            ));
        }

        if let Some(partial) = self.race_partial.lock().take() {
            *status = OrderStatus::new(StatusKind::Cancelled, partial);
            return Err(ExchangeError::api(
                110001,
                "order not exists or too late to cancel",
            ));
        }

        *status = OrderStatus::new(StatusKind::Cancelled, status.cum_filled);
        let placed = self.placed.lock();
        if let Some(order) = placed.last() {
            self.track_open(order, -1);
        }
        Ok(())
    }

    fn get_order_status(&self, _market: &MarketKey, order_id: &OrderId) -> ExchangeResult<OrderStatus> {
        self.statuses
            .lock()
            .get(order_id)
            .map(|(status, _)| *status)
            .ok_or_else(|| ExchangeError::api(110001, "order not exists"))
    }

    fn get_instrument_info(&self, _market: &MarketKey) -> ExchangeResult<InstrumentInfo> {
        Ok(self.info.lock().clone())
    }
}

struct Harness {
    placer: Arc<SmartOrderPlacer>,
}

fn harness(exchange: Arc<ScriptedExchange>, min_order_value: Decimal) -> Harness {
    let bridge = ConcurrencyBridge::new(4);
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        max_calls: 100_000,
        window_ms: 1_000,
    }));
    let cache = Arc::new(OrderBookCache::new(
        exchange.clone(),
        bridge.clone(),
        limiter.clone(),
        Duration::from_millis(30_000),
        10,
    ));
    let rules = Arc::new(InstrumentRules::new(
        exchange.clone(),
        bridge.clone(),
        limiter.clone(),
        InstrumentsConfig {
            min_order_value,
            ..InstrumentsConfig::default()
        },
    ));
    let monitor = OrderMonitor::new(
        exchange.clone(),
        bridge.clone(),
        limiter.clone(),
        MonitorConfig {
            poll_interval_ms: 10,
            summary_interval_ms: 60_000,
        },
    );
    monitor.spawn();

    let config = PlacerConfig {
        transient_backoff_ms: 10,
        ..PlacerConfig::default()
    };
    let placer = Arc::new(SmartOrderPlacer::new(
        exchange,
        bridge,
        limiter,
        cache,
        LiquidityClassifier::new(LiquidityConfig::default()),
        MakerPricer::new(OffsetTable::default()),
        rules,
        monitor,
        config,
    ));
    Harness { placer }
}

fn btc_market() -> MarketKey {
    MarketKey::new("BTCUSDT", MarketSegment::Perpetual)
}

fn fast_options(max_retries: u32) -> PlaceOptions {
    PlaceOptions {
        max_retries: Some(max_retries),
        attempt_timeout_ms: Some(40),
        allow_taker_fallback: false,
    }
}

#[tokio::test]
async fn test_high_liquidity_buy_fills_first_attempt() {
    let exchange = Arc::new(ScriptedExchange::btc());
    exchange.set_fill_on_place();
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(result.success);
    assert_eq!(result.tier, Some(LiquidityTier::High));
    assert_eq!(result.applied_offset, Some(dec!(0.0002)));
    assert_eq!(result.price.unwrap().inner(), dec!(50010));
    assert_eq!(result.retry_count, 0);
    assert!(!result.taker_fallback);
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 1);
    assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timeouts_exhaust_retries_without_fallback() {
    let exchange = Arc::new(ScriptedExchange::btc());
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(!result.success);
    assert_eq!(result.retry_count, 3);
    assert_eq!(
        result.failure.as_ref().unwrap().reason,
        FailureReason::RetriesExhausted
    );
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 3);
    assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 3);

    // The offset escalates, so each replacement prices more aggressively
    // while staying inside the spread.
    let placed = exchange.placed.lock();
    let prices: Vec<Decimal> = placed.iter().map(|o| o.price.inner()).collect();
    assert_eq!(prices.len(), 3);
    assert!(prices.windows(2).all(|w| w[0] < w[1]));
    assert!(prices.iter().all(|p| *p < dec!(50020)));
    assert!(placed.iter().all(|o| o.post_only));
}

#[tokio::test]
async fn test_min_notional_reject_corrected_without_consuming_retry() {
    // Stale metadata claims a 1-unit floor; the exchange enforces 5.
    let info = InstrumentInfo {
        tick_size: Price::new(dec!(0.01)),
        qty_step: Qty::new(dec!(0.001)),
        min_qty: Qty::new(dec!(0.001)),
        min_notional: dec!(1),
    };
    let exchange = Arc::new(ScriptedExchange::with_book(
        dec!(100),
        dec!(100.2),
        dec!(100),
        info,
    ));
    exchange.set_fill_on_place();
    exchange.script(vec![
        PlaceResponse::Reject(ExchangeError::api(
            110094,
            "Order value must be at least 5 USDT",
        )),
        PlaceResponse::Accept,
    ]);
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.02)));
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(result.success);
    assert_eq!(result.retry_count, 0);
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 2);

    // The resubmission sizes against the hinted floor with the rejection
    // safety margin.
    let placed = exchange.placed.lock();
    let corrected = &placed[1];
    assert!(corrected.qty.notional(corrected.price) >= dec!(5.25));
    assert!(corrected.qty > placed[0].qty);
}

#[tokio::test]
async fn test_second_min_notional_reject_is_fatal() {
    let exchange = Arc::new(ScriptedExchange::btc());
    exchange.script(vec![
        PlaceResponse::Reject(ExchangeError::api(110094, "Order value too low")),
        PlaceResponse::Reject(ExchangeError::api(110094, "Order value too low")),
    ]);
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(!result.success);
    assert_eq!(
        result.failure.as_ref().unwrap().reason,
        FailureReason::RepeatedFormatReject
    );
    assert_eq!(result.failure.as_ref().unwrap().exchange_code, Some(110094));
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_insufficient_balance_aborts_immediately() {
    let exchange = Arc::new(ScriptedExchange::btc());
    exchange.script(vec![PlaceResponse::Reject(ExchangeError::api(
        170131,
        "Insufficient balance",
    ))]);
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(!result.success);
    assert_eq!(
        result.failure.as_ref().unwrap().reason,
        FailureReason::NonRecoverable
    );
    assert_eq!(result.failure.as_ref().unwrap().exchange_code, Some(170131));
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 1);
    assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_error_resubmits_without_consuming_retry() {
    let exchange = Arc::new(ScriptedExchange::btc());
    exchange.set_fill_on_place();
    exchange.script(vec![
        PlaceResponse::Reject(ExchangeError::Timeout),
        PlaceResponse::Accept,
    ]);
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(result.success);
    assert_eq!(result.retry_count, 0);
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_taker_fallback_sweeps_after_budget() {
    let exchange = Arc::new(ScriptedExchange::btc());
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
    let options = fast_options(1).with_taker_fallback();
    let result = h.placer.place_order(request, options).await;

    assert!(result.success);
    assert!(result.taker_fallback);
    assert_eq!(result.retry_count, 1);

    let placed = exchange.placed.lock();
    let fallback = placed.last().unwrap();
    assert!(!fallback.post_only);
    // Crossing limit: priced through the ask with slippage allowance.
    assert!(fallback.price.inner() >= dec!(50020));
}

#[tokio::test]
async fn test_cancel_racing_fill_is_success() {
    let exchange = Arc::new(ScriptedExchange::btc());
    exchange.set_cancel_races_fill();
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(result.success);
    assert_eq!(result.retry_count, 0);
    assert!(!result.taker_fallback);
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 1);
    assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_placements_never_overlap_exposure() {
    let exchange = Arc::new(ScriptedExchange::btc());
    let h = harness(exchange.clone(), dec!(0));

    let a = {
        let placer = h.placer.clone();
        tokio::spawn(async move {
            let request =
                OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
            placer.place_order(request, fast_options(1)).await
        })
    };
    let b = {
        let placer = h.placer.clone();
        tokio::spawn(async move {
            let request =
                OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
            placer.place_order(request, fast_options(1)).await
        })
    };
    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());

    assert!(!ra.success && !rb.success);
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 2);
    // At most one live order per (symbol, side, segment), ever.
    assert!(exchange.max_open.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn test_partial_fill_at_cancel_shrinks_replacement() {
    let exchange = Arc::new(ScriptedExchange::btc());
    // 0.002 of the order executes between the monitor's last poll and
    // the cancel; the engine only learns it from the race status check.
    exchange.set_race_partial(Qty::new(dec!(0.002)));
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.003)));
    let result = h.placer.place_order(request, fast_options(2)).await;

    assert!(!result.success);
    let placed = exchange.placed.lock();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0].qty, Qty::new(dec!(0.003)));
    assert_eq!(placed[1].qty, Qty::new(dec!(0.001)));
}

#[tokio::test]
async fn test_external_cancel_partial_fill_shrinks_replacement() {
    let exchange = Arc::new(ScriptedExchange::btc());
    let h = harness(exchange.clone(), dec!(0));

    let task = {
        let placer = h.placer.clone();
        tokio::spawn(async move {
            let request =
                OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.003)));
            let options = PlaceOptions {
                max_retries: Some(2),
                attempt_timeout_ms: Some(5_000),
                allow_taker_fallback: false,
            };
            placer.place_order(request, options).await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Cancel the resting order behind the engine's back with a partial
    // execution on record; the replacement fills immediately.
    exchange.set_fill_on_place();
    {
        let mut statuses = exchange.statuses.lock();
        for (status, _) in statuses.values_mut() {
            *status = OrderStatus::new(StatusKind::Cancelled, Qty::new(dec!(0.002)));
        }
    }

    let result = task.await.unwrap();
    assert!(result.success);
    assert_eq!(result.retry_count, 1);
    let placed = exchange.placed.lock();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[1].qty, Qty::new(dec!(0.001)));
}

#[tokio::test]
async fn test_pending_order_tracked_until_terminal() {
    let exchange = Arc::new(ScriptedExchange::btc());
    let h = harness(exchange.clone(), dec!(0));

    let task = {
        let placer = h.placer.clone();
        tokio::spawn(async move {
            let request =
                OrderRequest::new(btc_market(), OrderSide::Buy, Qty::new(dec!(0.001)));
            let options = PlaceOptions {
                max_retries: Some(1),
                attempt_timeout_ms: Some(300),
                allow_taker_fallback: false,
            };
            placer.place_order(request, options).await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // While the order rests, the attempt is visible with its live state.
    let pending = h.placer.pending_orders();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].state, OrderState::Placed);
    assert_eq!(pending[0].market, btc_market());
    assert_eq!(pending[0].side, OrderSide::Buy);
    assert_eq!(pending[0].qty, Qty::new(dec!(0.001)));
    assert_eq!(pending[0].attempt, 0);

    // Terminal states clear the entry.
    let result = task.await.unwrap();
    assert!(!result.success);
    assert!(h.placer.pending_orders().is_empty());
}

#[tokio::test]
async fn test_invalid_request_rejected_without_submission() {
    let exchange = Arc::new(ScriptedExchange::btc());
    let h = harness(exchange.clone(), dec!(0));

    let request = OrderRequest::new(btc_market(), OrderSide::Buy, Qty::ZERO);
    let result = h.placer.place_order(request, fast_options(3)).await;

    assert!(!result.success);
    assert_eq!(
        result.failure.as_ref().unwrap().reason,
        FailureReason::InvalidRequest
    );
    assert_eq!(exchange.place_calls.load(Ordering::SeqCst), 0);
}
