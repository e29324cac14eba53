//! Cached instrument rules and order rounding.
//!
//! Metadata changes rarely, so entries live under a long TTL and are
//! force-refreshed only when the exchange rejects a submission for a
//! precision or minimum-notional reason. Rejection texts that hint at a
//! higher notional floor are recorded as per-market overrides so the
//! next sizing pass starts from the real constraint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use maker_core::{MarketKey, OrderSide, Price, Qty};
use maker_exchange::{ConcurrencyBridge, ExchangeClient, InstrumentInfo, RateLimiter};

use crate::error::{InstrumentsError, InstrumentsResult};

/// Instrument layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    /// Rules cache TTL in milliseconds. Metadata changes rarely.
    #[serde(default = "default_rules_ttl_ms")]
    pub rules_ttl_ms: u64,
    /// Deployment-level floor on order value, on top of exchange minimums.
    #[serde(default = "default_min_order_value")]
    pub min_order_value: Decimal,
    /// Safety margin applied when sizing against the notional floor at
    /// submission time (2% keeps re-rounding from dipping back under).
    #[serde(default = "default_submit_safety")]
    pub submit_safety_factor: Decimal,
    /// Larger margin applied after an exchange min-notional rejection.
    #[serde(default = "default_reject_safety")]
    pub reject_safety_factor: Decimal,
}

fn default_rules_ttl_ms() -> u64 {
    43_200_000 // 12 hours
}

fn default_min_order_value() -> Decimal {
    dec!(10)
}

fn default_submit_safety() -> Decimal {
    dec!(1.02)
}

fn default_reject_safety() -> Decimal {
    dec!(1.05)
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            rules_ttl_ms: default_rules_ttl_ms(),
            min_order_value: default_min_order_value(),
            submit_safety_factor: default_submit_safety(),
            reject_safety_factor: default_reject_safety(),
        }
    }
}

/// Outcome of rounding a (price, qty) pair against instrument rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundedOrder {
    pub price: Price,
    pub qty: Qty,
    /// False when the notional floor cannot be satisfied under the
    /// caller's constraints (exact quantity). Logged as a configuration
    /// conflict by the caller.
    pub notional_ok: bool,
}

struct RuleEntry {
    info: InstrumentInfo,
    stored_at: Instant,
}

/// Shared cache of instrument precision rules.
pub struct InstrumentRules {
    client: Arc<dyn ExchangeClient>,
    bridge: ConcurrencyBridge,
    limiter: Arc<RateLimiter>,
    config: InstrumentsConfig,
    entries: DashMap<MarketKey, RuleEntry>,
    /// Exchange-hinted notional floors, raised monotonically.
    overrides: DashMap<MarketKey, Decimal>,
}

impl InstrumentRules {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        bridge: ConcurrencyBridge,
        limiter: Arc<RateLimiter>,
        config: InstrumentsConfig,
    ) -> Self {
        Self {
            client,
            bridge,
            limiter,
            config,
            entries: DashMap::new(),
            overrides: DashMap::new(),
        }
    }

    pub fn config(&self) -> &InstrumentsConfig {
        &self.config
    }

    /// Get rules for a market, fetching if missing or past TTL.
    pub async fn rules_for(&self, market: &MarketKey) -> InstrumentsResult<InstrumentInfo> {
        let ttl = Duration::from_millis(self.config.rules_ttl_ms);
        if let Some(entry) = self.entries.get(market) {
            if entry.stored_at.elapsed() < ttl {
                return Ok(entry.info.clone());
            }
        }
        self.refresh(market).await
    }

    /// Force-fetch rules, bypassing the cache. Called after a
    /// precision/min-notional rejection.
    pub async fn refresh(&self, market: &MarketKey) -> InstrumentsResult<InstrumentInfo> {
        self.limiter.acquire().await;
        let client = self.client.clone();
        let key = market.clone();
        let info = self
            .bridge
            .run(move || client.get_instrument_info(&key))
            .await??;

        if !info.tick_size.is_positive() || !info.qty_step.is_positive() {
            return Err(InstrumentsError::InvalidMetadata {
                market: market.to_string(),
                detail: format!(
                    "tick_size={} qty_step={}",
                    info.tick_size, info.qty_step
                ),
            });
        }

        debug!(
            market = %market,
            tick = %info.tick_size,
            step = %info.qty_step,
            min_notional = %info.min_notional,
            "instrument rules refreshed"
        );
        self.entries.insert(
            market.clone(),
            RuleEntry {
                info: info.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(info)
    }

    /// Record a notional floor hinted by an exchange rejection. Overrides
    /// only ever increase.
    pub fn note_min_notional_hint(&self, market: &MarketKey, hint: Decimal) {
        let mut entry = self.overrides.entry(market.clone()).or_insert(Decimal::ZERO);
        if hint > *entry {
            info!(market = %market, %hint, "raising min-notional override");
            *entry = hint;
        }
    }

    /// Effective notional floor: the exchange rule, the deployment floor,
    /// and any hinted override, whichever is highest.
    pub fn effective_min_notional(&self, market: &MarketKey, info: &InstrumentInfo) -> Decimal {
        let hinted = self
            .overrides
            .get(market)
            .map(|v| *v)
            .unwrap_or(Decimal::ZERO);
        info.min_notional
            .max(self.config.min_order_value)
            .max(hinted)
    }

    /// Round a (price, qty) pair for submission.
    ///
    /// Price rounds to the nearest tick; quantity floors to the step and
    /// is bumped up (ceil on the step grid) if the result falls under the
    /// notional floor. With `exact_qty` the bump is forbidden, so an
    /// under-floor request reports `notional_ok = false`.
    pub fn round_order(
        &self,
        market: &MarketKey,
        info: &InstrumentInfo,
        price: Price,
        qty: Qty,
        exact_qty: bool,
        safety_factor: Decimal,
    ) -> RoundedOrder {
        let price = price.round_to_tick(info.tick_size);
        let mut rounded_qty = qty.floor_to_step(info.qty_step);
        if rounded_qty < info.min_qty {
            rounded_qty = info.min_qty.ceil_to_step(info.qty_step);
        }

        let floor = self.effective_min_notional(market, info) * safety_factor;
        let notional = rounded_qty.notional(price);
        if notional >= floor || price.is_zero() {
            return RoundedOrder {
                price,
                qty: rounded_qty,
                notional_ok: true,
            };
        }

        if exact_qty {
            warn!(
                market = %market,
                qty = %rounded_qty,
                %notional,
                %floor,
                "exact quantity cannot satisfy notional floor"
            );
            return RoundedOrder {
                price,
                qty: rounded_qty,
                notional_ok: false,
            };
        }

        // Bump up to the smallest step multiple clearing the floor.
        let required = Qty::new(floor / price.inner()).ceil_to_step(info.qty_step);
        let bumped = required.max(rounded_qty).max(info.min_qty);
        info!(
            market = %market,
            from = %rounded_qty,
            to = %bumped,
            %floor,
            "quantity bumped to satisfy notional floor"
        );
        RoundedOrder {
            price,
            qty: bumped,
            notional_ok: true,
        }
    }
}

/// Keep a rounded maker price strictly inside the spread.
///
/// Tick rounding can land the price on (or through) the opposite touch;
/// post-only would then reject the order. Nudge one tick back inside,
/// joining the touch when the spread is a single tick wide.
pub fn ensure_maker_price(
    price: Price,
    side: OrderSide,
    best_bid: Price,
    best_ask: Price,
    tick: Price,
) -> Price {
    match side {
        OrderSide::Buy => {
            if price >= best_ask {
                let inside = (best_ask - tick).floor_to_tick(tick);
                if inside.is_positive() {
                    inside.max(best_bid)
                } else {
                    best_bid
                }
            } else {
                price
            }
        }
        OrderSide::Sell => {
            if price <= best_bid {
                best_bid + tick
            } else {
                price
            }
        }
    }
}
