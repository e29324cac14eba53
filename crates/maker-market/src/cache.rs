//! TTL-bounded order book cache with single-flight fetching.
//!
//! One instance is shared process-wide. Concurrent `get` calls for the
//! same market while a fetch is in flight coalesce behind a per-key
//! async mutex, so N callers produce exactly one outbound request.
//! Fetch failures fall back to the last cached snapshot (flagged stale)
//! instead of failing outright; only a market that has never been cached
//! errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use maker_core::{MarketKey, OrderBookSnapshot};
use maker_exchange::{ConcurrencyBridge, ExchangeClient, RateLimiter};

use crate::error::{MarketError, MarketResult};

/// Where a returned snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSource {
    /// Fetched from the exchange on this call.
    Fresh,
    /// Served from cache within TTL.
    Cached,
    /// Served from cache past TTL because the refresh failed.
    Stale,
}

/// A snapshot plus its provenance.
#[derive(Debug, Clone)]
pub struct BookFetch {
    pub snapshot: OrderBookSnapshot,
    pub source: BookSource,
}

impl BookFetch {
    pub fn from_cache(&self) -> bool {
        self.source != BookSource::Fresh
    }

    pub fn is_stale(&self) -> bool {
        self.source == BookSource::Stale
    }
}

struct CacheEntry {
    snapshot: OrderBookSnapshot,
    stored_at: Instant,
}

/// Shared, TTL-bounded order book cache.
pub struct OrderBookCache {
    client: Arc<dyn ExchangeClient>,
    bridge: ConcurrencyBridge,
    limiter: Arc<RateLimiter>,
    ttl: Duration,
    depth: usize,
    entries: DashMap<MarketKey, CacheEntry>,
    /// Per-key fetch gates for single-flight coalescing. Bounded by the
    /// number of distinct markets, never evicted.
    inflight: DashMap<MarketKey, Arc<Mutex<()>>>,
}

impl OrderBookCache {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        bridge: ConcurrencyBridge,
        limiter: Arc<RateLimiter>,
        ttl: Duration,
        depth: usize,
    ) -> Self {
        Self {
            client,
            bridge,
            limiter,
            ttl,
            depth,
            entries: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Get a snapshot for a market, fetching only when the cached copy is
    /// missing or older than TTL.
    pub async fn get(&self, market: &MarketKey) -> MarketResult<BookFetch> {
        if let Some(snapshot) = self.fresh_entry(market) {
            return Ok(BookFetch {
                snapshot,
                source: BookSource::Cached,
            });
        }

        let gate = self
            .inflight
            .entry(market.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A coalesced waiter may find the entry refreshed by the flight
        // that held the gate before us.
        if let Some(snapshot) = self.fresh_entry(market) {
            return Ok(BookFetch {
                snapshot,
                source: BookSource::Cached,
            });
        }

        match self.fetch(market).await {
            Ok(snapshot) => {
                self.entries.insert(
                    market.clone(),
                    CacheEntry {
                        snapshot: snapshot.clone(),
                        stored_at: Instant::now(),
                    },
                );
                Ok(BookFetch {
                    snapshot,
                    source: BookSource::Fresh,
                })
            }
            Err(err) => {
                if let Some(entry) = self.entries.get(market) {
                    warn!(
                        market = %market,
                        error = %err,
                        age_ms = entry.stored_at.elapsed().as_millis() as u64,
                        "book refresh failed, serving stale snapshot"
                    );
                    return Ok(BookFetch {
                        snapshot: entry.snapshot.clone(),
                        source: BookSource::Stale,
                    });
                }
                Err(MarketError::NoBookAvailable {
                    market: market.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    /// Drop the cached entry for a market (e.g. after a suspicious fill).
    pub fn invalidate(&self, market: &MarketKey) {
        self.entries.remove(market);
    }

    fn fresh_entry(&self, market: &MarketKey) -> Option<OrderBookSnapshot> {
        let entry = self.entries.get(market)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry.snapshot.clone())
        } else {
            None
        }
    }

    async fn fetch(&self, market: &MarketKey) -> MarketResult<OrderBookSnapshot> {
        self.limiter.acquire().await;
        let client = self.client.clone();
        let key = market.clone();
        let depth = self.depth;
        let snapshot = self
            .bridge
            .run(move || client.get_order_book(&key, depth))
            .await??;

        // A crossed top of book is corrupt; discard rather than cache.
        let state = snapshot.state();
        if state == maker_core::BookState::Crossed {
            return Err(MarketError::CorruptBook {
                market: market.to_string(),
                state: state.to_string(),
            });
        }

        debug!(market = %market, levels = snapshot.bids.len(), "order book fetched");
        Ok(snapshot)
    }
}
