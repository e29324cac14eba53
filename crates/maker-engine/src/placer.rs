//! The smart maker order placement state machine.
//!
//! One `place_order` call drives an order through
//! place → wait → cancel → retry until it fills, the retry budget runs
//! out, or a fatal error aborts it. Maker attempts never cross the
//! spread; once the budget is exhausted an optional taker fallback
//! sweeps the remainder. Transient exchange errors back off and
//! resubmit without consuming maker retries; formatting rejections are
//! corrected in place once per class, then escalate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use maker_core::{
    FailureReason, LiquidityTier, MarketKey, OrderFailure, OrderId, OrderLinkId, OrderRequest,
    OrderResult, OrderSide, OrderState, PendingOrder, Price, Qty,
};
use maker_exchange::{
    ConcurrencyBridge, ExchangeClient, InstrumentInfo, NewOrder, RateLimiter,
};
use maker_instruments::{ensure_maker_price, InstrumentRules};
use maker_market::{LiquidityClassifier, MakerPricer, OrderBookCache};
use maker_monitor::{OrderMonitor, WatchEvent, WatchRequest};

use crate::config::{PlaceOptions, PlacerConfig};

type ExposureKey = (MarketKey, OrderSide);

/// Outcome of one submission, after transient and formatting handling.
enum Submitted {
    Placed {
        order_id: OrderId,
        price: Price,
        qty: Qty,
    },
    Fatal(OrderFailure),
}

/// Outcome of cancelling a timed-out order.
enum Cancelled {
    /// The cancel was acknowledged; the order is off the book. Carries
    /// the cumulative fill the closing status reported, when one was
    /// observed.
    Done { cum_filled: Option<Qty> },
    /// The order filled before the cancel landed.
    RacedFill,
    Fatal(OrderFailure),
}

/// Orchestrates book fetch, classification, pricing, rounding,
/// submission, monitoring and retries for maker orders.
pub struct SmartOrderPlacer {
    client: Arc<dyn ExchangeClient>,
    bridge: ConcurrencyBridge,
    limiter: Arc<RateLimiter>,
    cache: Arc<OrderBookCache>,
    classifier: LiquidityClassifier,
    pricer: MakerPricer,
    rules: Arc<InstrumentRules>,
    monitor: Arc<OrderMonitor>,
    config: PlacerConfig,
    /// Serializes placements per (symbol, side, segment) so the engine
    /// never carries two live orders for the same exposure.
    exposure: DashMap<ExposureKey, Arc<Mutex<()>>>,
    /// Live maker attempts, keyed by exchange order id. Entries exist
    /// from submission to the terminal state of that attempt.
    pending: DashMap<OrderId, PendingOrder>,
}

impl SmartOrderPlacer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        bridge: ConcurrencyBridge,
        limiter: Arc<RateLimiter>,
        cache: Arc<OrderBookCache>,
        classifier: LiquidityClassifier,
        pricer: MakerPricer,
        rules: Arc<InstrumentRules>,
        monitor: Arc<OrderMonitor>,
        config: PlacerConfig,
    ) -> Self {
        Self {
            client,
            bridge,
            limiter,
            cache,
            classifier,
            pricer,
            rules,
            monitor,
            config,
            exposure: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Snapshot of the live maker attempts, for display subsystems.
    pub fn pending_orders(&self) -> Vec<PendingOrder> {
        self.pending.iter().map(|entry| entry.value().clone()).collect()
    }

    fn mark_pending(&self, order_id: &OrderId, state: OrderState) {
        if let Some(mut entry) = self.pending.get_mut(order_id) {
            entry.transition(state);
        }
    }

    fn settle_pending(&self, order_id: &OrderId, terminal: OrderState) {
        if let Some((_, mut pending)) = self.pending.remove(order_id) {
            pending.transition(terminal);
            debug!(order_id = %order_id, state = %pending.state, "pending order settled");
        }
    }

    /// Place an order as a maker, retrying on timeouts, and return the
    /// terminal result. Expected failures never escape as errors.
    pub async fn place_order(&self, request: OrderRequest, options: PlaceOptions) -> OrderResult {
        let started = Instant::now();
        let link_id = request.link_id.clone();

        if !request.qty.is_positive() || request.market.symbol.is_empty() {
            let failure = OrderFailure::new(
                FailureReason::InvalidRequest,
                format!("qty={} symbol={:?}", request.qty, request.market.symbol),
            );
            return finish(OrderResult::failed(link_id, 0, failure), started);
        }

        let gate = self
            .exposure
            .entry((request.market.clone(), request.side))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        let result = self.run(&request, &options).await;
        if result.success {
            info!(
                market = %request.market,
                side = %request.side,
                link_id = %result.link_id,
                retries = result.retry_count,
                taker_fallback = result.taker_fallback,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "placement succeeded"
            );
        } else if let Some(failure) = &result.failure {
            warn!(
                market = %request.market,
                side = %request.side,
                link_id = %result.link_id,
                retries = result.retry_count,
                reason = %failure.reason,
                code = failure.exchange_code,
                "placement failed"
            );
        }
        finish(result, started)
    }

    async fn run(&self, request: &OrderRequest, options: &PlaceOptions) -> OrderResult {
        let market = &request.market;
        let link_id = request.link_id.clone();

        let mut info = match self.rules.rules_for(market).await {
            Ok(info) => info,
            Err(err) => {
                let failure =
                    OrderFailure::new(FailureReason::ExchangeUnavailable, err.to_string());
                return OrderResult::failed(link_id, 0, failure);
            }
        };

        let policy = self.config.policy(market.segment);
        let max_retries = options.max_retries.unwrap_or(policy.max_retries).max(1);
        let attempt_timeout = Duration::from_millis(
            options.attempt_timeout_ms.unwrap_or(policy.attempt_timeout_ms),
        );

        let mut remaining = request.qty;
        let mut precision_corrected = false;
        let mut notional_corrected = false;
        let mut last_code: Option<i64> = None;
        let mut last_tier: Option<LiquidityTier> = None;

        for attempt in 0..max_retries {
            let fetch = match self.cache.get(market).await {
                Ok(fetch) => fetch,
                Err(err) => {
                    let failure =
                        OrderFailure::new(FailureReason::MarketDataUnavailable, err.to_string());
                    return with_tier(
                        OrderResult::failed(link_id, attempt, failure),
                        last_tier,
                    );
                }
            };
            let snapshot = fetch.snapshot;
            let tier = self.classifier.classify(&snapshot);
            last_tier = Some(tier);

            let (Some(best_bid), Some(best_ask)) = (snapshot.best_bid(), snapshot.best_ask())
            else {
                let failure = OrderFailure::new(
                    FailureReason::MarketDataUnavailable,
                    format!("book for {market} is missing a touch"),
                );
                return with_tier(OrderResult::failed(link_id, attempt, failure), last_tier);
            };
            let Some(quote) = self.pricer.compute(request.side, &snapshot, tier, attempt) else {
                let failure = OrderFailure::new(
                    FailureReason::MarketDataUnavailable,
                    format!("book for {market} is missing a touch"),
                );
                return with_tier(OrderResult::failed(link_id, attempt, failure), last_tier);
            };

            let rounded = self.rules.round_order(
                market,
                &info,
                quote.price,
                remaining,
                request.exact_qty,
                self.rules.config().submit_safety_factor,
            );
            if !rounded.notional_ok {
                let failure = OrderFailure::new(
                    FailureReason::NotionalConflict,
                    format!("exact qty {} cannot satisfy the notional floor", remaining),
                );
                return with_tier(OrderResult::failed(link_id, attempt, failure), last_tier);
            }
            let price =
                ensure_maker_price(rounded.price, request.side, best_bid, best_ask, info.tick_size);

            info!(
                market = %market,
                side = %request.side,
                %tier,
                offset = %quote.offset,
                %price,
                qty = %rounded.qty,
                attempt,
                "submitting maker order"
            );

            let submitted = self
                .submit_with_corrections(
                    request,
                    &mut info,
                    price,
                    rounded.qty,
                    remaining,
                    quote.price,
                    best_bid,
                    best_ask,
                    &mut precision_corrected,
                    &mut notional_corrected,
                    &mut last_code,
                )
                .await;
            let (order_id, placed_price, placed_qty) = match submitted {
                Submitted::Placed {
                    order_id,
                    price,
                    qty,
                } => (order_id, price, qty),
                Submitted::Fatal(failure) => {
                    return with_tier(OrderResult::failed(link_id, attempt, failure), last_tier)
                }
            };
            self.pending.insert(
                order_id.clone(),
                PendingOrder {
                    order_id: order_id.clone(),
                    market: market.clone(),
                    side: request.side,
                    price: placed_price,
                    qty: placed_qty,
                    tier,
                    applied_offset: quote.offset,
                    attempt,
                    placed_at: Utc::now(),
                    state: OrderState::Placed,
                },
            );

            let deadline = Instant::now() + attempt_timeout;
            let event_rx = self.monitor.watch(WatchRequest::new(
                order_id.clone(),
                market.clone(),
                request.side,
                placed_qty,
                placed_price,
                deadline,
            ));

            let event = match event_rx.await {
                Ok(event) => event,
                // The registration vanished without an event; treat it
                // like an external cancel and retry.
                Err(_) => WatchEvent::Cancelled {
                    last_filled: Qty::ZERO,
                },
            };

            match event {
                WatchEvent::Filled { .. } => {
                    self.settle_pending(&order_id, OrderState::Filled);
                    return OrderResult::filled(
                        order_id,
                        link_id,
                        placed_price,
                        quote.offset,
                        tier,
                        attempt,
                    );
                }
                WatchEvent::Cancelled { last_filled } => {
                    remaining = remaining.saturating_sub(last_filled);
                    if remaining.floor_to_step(info.qty_step).is_zero() {
                        self.settle_pending(&order_id, OrderState::Filled);
                        return OrderResult::filled(
                            order_id,
                            link_id,
                            placed_price,
                            quote.offset,
                            tier,
                            attempt,
                        );
                    }
                    self.settle_pending(&order_id, OrderState::Replaced);
                    warn!(
                        market = %market,
                        order_id = %order_id,
                        attempt,
                        filled = %last_filled,
                        "order cancelled outside the engine, retrying"
                    );
                    continue;
                }
                WatchEvent::TimedOut { last_filled } => {
                    if last_filled.is_positive() {
                        self.mark_pending(&order_id, OrderState::PartiallyFilled);
                    }
                    self.mark_pending(&order_id, OrderState::TimedOut);
                    debug!(
                        market = %market,
                        order_id = %order_id,
                        attempt,
                        filled = %last_filled,
                        "attempt timed out, cancelling"
                    );
                    self.mark_pending(&order_id, OrderState::Cancelling);
                    match self.cancel_timed_out(market, &order_id).await {
                        Cancelled::Done { cum_filled } => {
                            // A fill can land between the monitor's last
                            // poll and the cancel; trust whichever count
                            // is larger.
                            let filled = cum_filled.map_or(last_filled, |f| f.max(last_filled));
                            remaining = remaining.saturating_sub(filled);
                        }
                        Cancelled::RacedFill => {
                            info!(
                                market = %market,
                                order_id = %order_id,
                                "cancel raced a fill, order completed"
                            );
                            self.settle_pending(&order_id, OrderState::Filled);
                            return OrderResult::filled(
                                order_id,
                                link_id,
                                placed_price,
                                quote.offset,
                                tier,
                                attempt,
                            );
                        }
                        Cancelled::Fatal(failure) => {
                            self.settle_pending(&order_id, OrderState::Failed);
                            return with_tier(
                                OrderResult::failed(link_id, attempt + 1, failure),
                                last_tier,
                            );
                        }
                    }
                    // Partial fills can leave less than one step behind.
                    if remaining.floor_to_step(info.qty_step).is_zero() {
                        self.settle_pending(&order_id, OrderState::Filled);
                        return OrderResult::filled(
                            order_id,
                            link_id,
                            placed_price,
                            quote.offset,
                            tier,
                            attempt,
                        );
                    }
                    let next = if attempt + 1 < max_retries {
                        OrderState::Replaced
                    } else if options.allow_taker_fallback {
                        OrderState::FallbackPlaced
                    } else {
                        OrderState::Failed
                    };
                    self.settle_pending(&order_id, next);
                }
            }
        }

        if options.allow_taker_fallback {
            return self
                .taker_fallback(request, &info, remaining, max_retries, last_tier)
                .await;
        }

        let mut failure = OrderFailure::new(
            FailureReason::RetriesExhausted,
            format!("{max_retries} maker attempts timed out"),
        );
        if let Some(code) = last_code {
            failure = failure.with_code(code);
        }
        with_tier(OrderResult::failed(link_id, max_retries, failure), last_tier)
    }

    /// Submit one order, absorbing transient errors with backoff and
    /// correcting formatting rejections in place. A second rejection of
    /// the same formatting class is fatal.
    #[allow(clippy::too_many_arguments)]
    async fn submit_with_corrections(
        &self,
        request: &OrderRequest,
        info: &mut InstrumentInfo,
        price: Price,
        qty: Qty,
        remaining: Qty,
        raw_price: Price,
        best_bid: Price,
        best_ask: Price,
        precision_corrected: &mut bool,
        notional_corrected: &mut bool,
        last_code: &mut Option<i64>,
    ) -> Submitted {
        let market = &request.market;
        let mut new_order = NewOrder {
            market: market.clone(),
            side: request.side,
            qty,
            price,
            post_only: true,
            link_id: request.link_id.clone(),
        };
        let mut transient_tries = 0u32;

        loop {
            self.limiter.acquire().await;
            let client = self.client.clone();
            let order = new_order.clone();
            let placed = match self.bridge.run(move || client.place_order(&order)).await {
                Ok(placed) => placed,
                Err(err) => {
                    return Submitted::Fatal(OrderFailure::new(
                        FailureReason::ExchangeUnavailable,
                        err.to_string(),
                    ));
                }
            };

            let err = match placed {
                Ok(order_id) => {
                    return Submitted::Placed {
                        order_id,
                        price: new_order.price,
                        qty: new_order.qty,
                    };
                }
                Err(err) => err,
            };
            *last_code = err.code().or(*last_code);

            if err.is_transient() {
                transient_tries += 1;
                if transient_tries > self.config.transient_retry_limit {
                    let mut failure = OrderFailure::new(
                        FailureReason::ExchangeUnavailable,
                        format!("transient errors exhausted: {err}"),
                    );
                    if let Some(code) = err.code() {
                        failure = failure.with_code(code);
                    }
                    return Submitted::Fatal(failure);
                }
                let backoff = Duration::from_millis(
                    self.config.transient_backoff_ms << (transient_tries - 1),
                );
                warn!(
                    market = %market,
                    error = %err,
                    try_no = transient_tries,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient submission error, backing off"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if err.is_non_recoverable() {
                let mut failure =
                    OrderFailure::new(FailureReason::NonRecoverable, err.to_string());
                if let Some(code) = err.code() {
                    failure = failure.with_code(code);
                }
                return Submitted::Fatal(failure);
            }

            if err.is_below_min_notional() {
                if *notional_corrected {
                    let mut failure = OrderFailure::new(
                        FailureReason::RepeatedFormatReject,
                        format!("min-notional rejection recurred: {err}"),
                    );
                    if let Some(code) = err.code() {
                        failure = failure.with_code(code);
                    }
                    return Submitted::Fatal(failure);
                }
                *notional_corrected = true;

                if let Some(hint) = err.hinted_min_notional() {
                    self.rules.note_min_notional_hint(market, hint);
                }
                if let Ok(refreshed) = self.rules.refresh(market).await {
                    *info = refreshed;
                }
                let corrected = self.rules.round_order(
                    market,
                    info,
                    raw_price,
                    remaining,
                    request.exact_qty,
                    self.rules.config().reject_safety_factor,
                );
                if !corrected.notional_ok {
                    return Submitted::Fatal(OrderFailure::new(
                        FailureReason::NotionalConflict,
                        format!("exact qty {remaining} cannot satisfy the hinted floor"),
                    ));
                }
                new_order.qty = corrected.qty;
                new_order.price = ensure_maker_price(
                    corrected.price,
                    request.side,
                    best_bid,
                    best_ask,
                    info.tick_size,
                );
                info!(
                    market = %market,
                    qty = %new_order.qty,
                    price = %new_order.price,
                    "resubmitting after min-notional correction"
                );
                continue;
            }

            if err.is_precision_reject() {
                if *precision_corrected {
                    let mut failure = OrderFailure::new(
                        FailureReason::RepeatedFormatReject,
                        format!("precision rejection recurred: {err}"),
                    );
                    if let Some(code) = err.code() {
                        failure = failure.with_code(code);
                    }
                    return Submitted::Fatal(failure);
                }
                *precision_corrected = true;

                if let Ok(refreshed) = self.rules.refresh(market).await {
                    *info = refreshed;
                }
                let corrected = self.rules.round_order(
                    market,
                    info,
                    raw_price,
                    remaining,
                    request.exact_qty,
                    self.rules.config().submit_safety_factor,
                );
                if !corrected.notional_ok {
                    return Submitted::Fatal(OrderFailure::new(
                        FailureReason::NotionalConflict,
                        format!("exact qty {remaining} cannot satisfy the notional floor"),
                    ));
                }
                new_order.qty = corrected.qty;
                new_order.price = ensure_maker_price(
                    corrected.price,
                    request.side,
                    best_bid,
                    best_ask,
                    info.tick_size,
                );
                info!(
                    market = %market,
                    qty = %new_order.qty,
                    price = %new_order.price,
                    "resubmitting after precision correction"
                );
                continue;
            }

            // Anything else is a request the exchange will never accept.
            let mut failure = OrderFailure::new(FailureReason::InvalidRequest, err.to_string());
            if let Some(code) = err.code() {
                failure = failure.with_code(code);
            }
            return Submitted::Fatal(failure);
        }
    }

    /// Cancel a timed-out order, tolerating the race where it fills
    /// before the cancel lands.
    async fn cancel_timed_out(&self, market: &MarketKey, order_id: &OrderId) -> Cancelled {
        let mut transient_tries = 0u32;
        loop {
            self.limiter.acquire().await;
            let client = self.client.clone();
            let key = market.clone();
            let id = order_id.clone();
            let cancelled = match self
                .bridge
                .run(move || client.cancel_order(&key, &id))
                .await
            {
                Ok(cancelled) => cancelled,
                Err(err) => {
                    return Cancelled::Fatal(OrderFailure::new(
                        FailureReason::ExchangeUnavailable,
                        err.to_string(),
                    ));
                }
            };

            match cancelled {
                Ok(()) => return Cancelled::Done { cum_filled: None },
                Err(err) if err.is_order_not_open() => {
                    return self.resolve_cancel_race(market, order_id).await;
                }
                Err(err) if err.is_transient() => {
                    transient_tries += 1;
                    if transient_tries > self.config.transient_retry_limit {
                        let mut failure = OrderFailure::new(
                            FailureReason::ExchangeUnavailable,
                            format!("cancel kept failing: {err}"),
                        );
                        if let Some(code) = err.code() {
                            failure = failure.with_code(code);
                        }
                        return Cancelled::Fatal(failure);
                    }
                    let backoff = Duration::from_millis(
                        self.config.transient_backoff_ms << (transient_tries - 1),
                    );
                    warn!(
                        market = %market,
                        order_id = %order_id,
                        error = %err,
                        "transient cancel error, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    let mut failure =
                        OrderFailure::new(FailureReason::ExchangeUnavailable, err.to_string());
                    if let Some(code) = err.code() {
                        failure = failure.with_code(code);
                    }
                    return Cancelled::Fatal(failure);
                }
            }
        }
    }

    /// The exchange said the order is no longer open. Find out which way
    /// the race went.
    async fn resolve_cancel_race(&self, market: &MarketKey, order_id: &OrderId) -> Cancelled {
        self.limiter.acquire().await;
        let client = self.client.clone();
        let key = market.clone();
        let id = order_id.clone();
        let status = match self
            .bridge
            .run(move || client.get_order_status(&key, &id))
            .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                warn!(
                    market = %market,
                    order_id = %order_id,
                    error = %err,
                    "status check after cancel race failed, assuming cancelled"
                );
                return Cancelled::Done { cum_filled: None };
            }
            Err(err) => {
                return Cancelled::Fatal(OrderFailure::new(
                    FailureReason::ExchangeUnavailable,
                    err.to_string(),
                ));
            }
        };

        if status.is_filled() {
            info!(
                market = %market,
                order_id = %order_id,
                cum_filled = %status.cum_filled,
                "order filled before the cancel landed"
            );
            Cancelled::RacedFill
        } else {
            Cancelled::Done {
                cum_filled: Some(status.cum_filled),
            }
        }
    }

    /// Sweep the remainder with an aggressive crossing limit order.
    async fn taker_fallback(
        &self,
        request: &OrderRequest,
        info: &InstrumentInfo,
        remaining: Qty,
        retry_count: u32,
        last_tier: Option<LiquidityTier>,
    ) -> OrderResult {
        let market = &request.market;
        let link_id = request.link_id.clone();

        let fetch = match self.cache.get(market).await {
            Ok(fetch) => fetch,
            Err(err) => {
                let failure =
                    OrderFailure::new(FailureReason::MarketDataUnavailable, err.to_string());
                return with_tier(
                    OrderResult::failed(link_id, retry_count, failure),
                    last_tier,
                );
            }
        };
        let touch = match request.side {
            OrderSide::Buy => fetch.snapshot.best_ask(),
            OrderSide::Sell => fetch.snapshot.best_bid(),
        };
        let Some(touch) = touch else {
            let failure = OrderFailure::new(
                FailureReason::MarketDataUnavailable,
                format!("no opposite touch for the {} fallback", request.side),
            );
            return with_tier(
                OrderResult::failed(link_id, retry_count, failure),
                last_tier,
            );
        };

        let slip = self.config.fallback_slippage;
        let raw = match request.side {
            OrderSide::Buy => touch * (Decimal::ONE + slip),
            OrderSide::Sell => touch * (Decimal::ONE - slip),
        };
        let price = raw.round_to_tick(info.tick_size);
        let mut qty = remaining.floor_to_step(info.qty_step);
        if qty < info.min_qty {
            qty = info.min_qty.ceil_to_step(info.qty_step);
        }

        info!(
            market = %market,
            side = %request.side,
            %price,
            %qty,
            "maker budget exhausted, submitting taker fallback"
        );

        let new_order = NewOrder {
            market: market.clone(),
            side: request.side,
            qty,
            price,
            post_only: false,
            // The maker link id is already consumed on the exchange side.
            link_id: OrderLinkId::new(),
        };

        let mut transient_tries = 0u32;
        loop {
            self.limiter.acquire().await;
            let client = self.client.clone();
            let order = new_order.clone();
            let placed = match self.bridge.run(move || client.place_order(&order)).await {
                Ok(placed) => placed,
                Err(err) => {
                    let failure =
                        OrderFailure::new(FailureReason::ExchangeUnavailable, err.to_string());
                    return with_tier(
                        OrderResult::failed(link_id, retry_count, failure),
                        last_tier,
                    );
                }
            };

            match placed {
                Ok(order_id) => {
                    let mut result = OrderResult::filled(
                        order_id,
                        link_id,
                        price,
                        Decimal::ZERO,
                        last_tier.unwrap_or(LiquidityTier::Low),
                        retry_count,
                    );
                    result.taker_fallback = true;
                    result.applied_offset = None;
                    return result;
                }
                Err(err) if err.is_transient() => {
                    transient_tries += 1;
                    if transient_tries > self.config.transient_retry_limit {
                        let mut failure = OrderFailure::new(
                            FailureReason::ExchangeUnavailable,
                            format!("taker fallback kept failing: {err}"),
                        );
                        if let Some(code) = err.code() {
                            failure = failure.with_code(code);
                        }
                        return with_tier(
                            OrderResult::failed(link_id, retry_count, failure),
                            last_tier,
                        );
                    }
                    let backoff = Duration::from_millis(
                        self.config.transient_backoff_ms << (transient_tries - 1),
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    let reason = if err.is_non_recoverable() {
                        FailureReason::NonRecoverable
                    } else {
                        FailureReason::InvalidRequest
                    };
                    let mut failure = OrderFailure::new(reason, err.to_string());
                    if let Some(code) = err.code() {
                        failure = failure.with_code(code);
                    }
                    return with_tier(
                        OrderResult::failed(link_id, retry_count, failure),
                        last_tier,
                    );
                }
            }
        }
    }
}

fn finish(mut result: OrderResult, started: Instant) -> OrderResult {
    result.elapsed_ms = started.elapsed().as_millis() as u64;
    result
}

fn with_tier(mut result: OrderResult, tier: Option<LiquidityTier>) -> OrderResult {
    result.tier = tier;
    result
}
