//! # cache — TickCache
//!
//! Rolling per-symbol store of [`Trade`] and [`Quote`] ticks.
//!
//! ```text
//! add_trade ──▶ VecDeque<Trade>  (cap N, FIFO eviction)  ──▶ last_price / vwap / price_change
//! add_quote ──▶ VecDeque<Quote>  (cap N, FIFO eviction)  ──▶ last_quote / spread_bps
//! ```
//!
//! - Append = O(1); statistics = O(N) over a window of at most N ticks.
//! - Insertion order = arrival order. Out-of-order timestamps are kept as-is.
//! - Accessors never fail: missing or insufficient data is `None`.
//! - Lookback filters ("last 60s") compare against wall-clock *now*, not the
//!   newest tick, so a quiet symbol ages out of VWAP on its own. The `*_at`
//!   variants take an explicit instant.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::InvalidTickError;
use crate::models::{Quote, Trade};

/// ค่า default ของจำนวน Tick ที่เก็บต่อ Symbol
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

// ─── Statistics ───────────────────────────────────────────────────────────────

/// Snapshot bundle for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub symbol:            String,
    pub num_trades:        usize,
    pub num_quotes:        usize,
    pub last_price:        Option<f64>,
    pub vwap_1min:         Option<f64>,
    pub price_change_5min: Option<f64>,
    pub spread_bps:        Option<f64>,
}

// ─── TickCache ────────────────────────────────────────────────────────────────

/// Owned by the tick path only — no locks, single writer.
#[derive(Debug)]
pub struct TickCache {
    trades:      HashMap<String, VecDeque<Trade>>,
    quotes:      HashMap<String, VecDeque<Quote>>,
    window_size: usize,
}

impl TickCache {
    pub fn new(window_size: usize) -> Self {
        Self {
            trades:      HashMap::new(),
            quotes:      HashMap::new(),
            window_size: window_size.max(1),
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Append a trade print. Malformed prints are rejected, never dropped silently.
    pub fn add_trade(
        &mut self,
        symbol: &str,
        price: f64,
        size: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), InvalidTickError> {
        let trade = Trade::new(symbol, price, size, timestamp)?;
        let cap = self.window_size;
        let window = self
            .trades
            .entry(trade.symbol.clone())
            .or_insert_with(|| VecDeque::with_capacity(cap.min(64)));
        push_bounded(window, trade, cap);
        Ok(())
    }

    /// Append a quote. `spread = ask − bid` is fixed here.
    pub fn add_quote(
        &mut self,
        symbol: &str,
        bid: f64,
        ask: f64,
        bid_size: f64,
        ask_size: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), InvalidTickError> {
        let quote = Quote::new(symbol, bid, ask, bid_size, ask_size, timestamp)?;
        let cap = self.window_size;
        let window = self
            .quotes
            .entry(quote.symbol.clone())
            .or_insert_with(|| VecDeque::with_capacity(cap.min(64)));
        push_bounded(window, quote, cap);
        Ok(())
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// The trade window for `symbol`, oldest first.
    pub fn trades(&self, symbol: &str) -> Option<&VecDeque<Trade>> {
        self.trades.get(symbol)
    }

    pub fn trade_count(&self, symbol: &str) -> usize {
        self.trades.get(symbol).map_or(0, VecDeque::len)
    }

    pub fn quote_count(&self, symbol: &str) -> usize {
        self.quotes.get(symbol).map_or(0, VecDeque::len)
    }

    /// The last `n` trades (fewer if the window is shorter), oldest first.
    pub fn recent_trades(&self, symbol: &str, n: usize) -> Vec<&Trade> {
        match self.trades.get(symbol) {
            Some(window) => window.iter().skip(window.len().saturating_sub(n)).collect(),
            None => Vec::new(),
        }
    }

    pub fn last_trade(&self, symbol: &str) -> Option<&Trade> {
        self.trades.get(symbol).and_then(|w| w.back())
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_trade(symbol).map(|t| t.price)
    }

    pub fn last_quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol).and_then(|w| w.back())
    }

    // ── Derived Statistics ────────────────────────────────────────────────────

    /// Volume-weighted average price over trades newer than `now − lookback`.
    pub fn vwap(&self, symbol: &str, lookback_secs: i64) -> Option<f64> {
        self.vwap_at(symbol, lookback_secs, Utc::now())
    }

    pub fn vwap_at(&self, symbol: &str, lookback_secs: i64, now: DateTime<Utc>) -> Option<f64> {
        let cutoff = now - Duration::seconds(lookback_secs);
        let (value, volume) = self
            .trades
            .get(symbol)?
            .iter()
            .filter(|t| t.timestamp > cutoff)
            .fold((0.0, 0.0), |(v, s), t| (v + t.price * t.size, s + t.size));

        if volume > 0.0 { Some(value / volume) } else { None }
    }

    /// `(latest − earliest) / earliest` over trades newer than `now − lookback`.
    /// Needs at least two qualifying trades.
    pub fn price_change(&self, symbol: &str, lookback_secs: i64) -> Option<f64> {
        self.price_change_at(symbol, lookback_secs, Utc::now())
    }

    pub fn price_change_at(&self, symbol: &str, lookback_secs: i64, now: DateTime<Utc>) -> Option<f64> {
        let cutoff = now - Duration::seconds(lookback_secs);
        let mut recent = self.trades.get(symbol)?.iter().filter(|t| t.timestamp > cutoff);

        let first = recent.next()?;
        let last = recent.last()?;
        Some((last.price - first.price) / first.price)
    }

    /// `(ask − bid) / bid × 10,000` from the latest quote; `None` if bid is 0.
    pub fn spread_bps(&self, symbol: &str) -> Option<f64> {
        let quote = self.last_quote(symbol)?;
        if quote.bid == 0.0 {
            return None;
        }
        Some((quote.ask - quote.bid) / quote.bid * 10_000.0)
    }

    pub fn statistics(&self, symbol: &str) -> CacheStatistics {
        self.statistics_at(symbol, Utc::now())
    }

    pub fn statistics_at(&self, symbol: &str, now: DateTime<Utc>) -> CacheStatistics {
        CacheStatistics {
            symbol:            symbol.to_string(),
            num_trades:        self.trade_count(symbol),
            num_quotes:        self.quote_count(symbol),
            last_price:        self.last_price(symbol),
            vwap_1min:         self.vwap_at(symbol, 60, now),
            price_change_5min: self.price_change_at(symbol, 300, now),
            spread_bps:        self.spread_bps(symbol),
        }
    }
}

impl Default for TickCache {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, item: T, cap: usize) {
    while window.len() >= cap {
        window.pop_front(); // ลบ Tick เก่าสุด
    }
    window.push_back(item);
}

// ─── Tests ────────────────────────────────────────────────────────────────────
