//! # models::tick
//!
//! Defines [`Trade`] and [`Quote`], the raw market pulse pushed by the
//! brokerage stream for every watched symbol, plus [`MarketEvent`] — the
//! envelope the feed hands to the orchestrator.
//!
//! Both tick types are small and `Clone`-able: the tick path appends them to
//! the cache and never mutates them afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidTickError;

// ─── Trade ────────────────────────────────────────────────────────────────────

/// A single executed trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// The trading symbol, e.g. `"AAPL"`, `"SPY"`.
    pub symbol: String,
    /// Execution price. Always `> 0` once recorded.
    pub price: f64,
    /// Shares traded. Always `> 0` once recorded.
    pub size: f64,
    /// Exchange timestamp (UTC). Not guaranteed monotonic across ticks.
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Builds a trade, rejecting prints that would poison downstream statistics.
    pub fn new(
        symbol: &str,
        price: f64,
        size: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, InvalidTickError> {
        if symbol.trim().is_empty() {
            return Err(InvalidTickError::EmptySymbol);
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(InvalidTickError::NonPositivePrice { symbol: symbol.to_string(), price });
        }
        if !(size.is_finite() && size > 0.0) {
            return Err(InvalidTickError::NonPositiveSize { symbol: symbol.to_string(), size });
        }

        Ok(Self { symbol: symbol.to_string(), price, size, timestamp })
    }
}

// ─── Quote ────────────────────────────────────────────────────────────────────

/// Top-of-book bid/ask snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol:    String,
    /// Best bid (price at which the market buys from us).
    pub bid:       f64,
    /// Best ask (price at which the market sells to us).
    pub ask:       f64,
    pub bid_size:  f64,
    pub ask_size:  f64,
    /// `ask − bid`, fixed at insert time.
    pub spread:    f64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        symbol: &str,
        bid: f64,
        ask: f64,
        bid_size: f64,
        ask_size: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, InvalidTickError> {
        if symbol.trim().is_empty() {
            return Err(InvalidTickError::EmptySymbol);
        }
        if !(bid.is_finite() && bid >= 0.0) {
            return Err(InvalidTickError::NegativeBid { symbol: symbol.to_string(), bid });
        }
        if !ask.is_finite() || ask < bid {
            return Err(InvalidTickError::CrossedQuote { symbol: symbol.to_string(), bid, ask });
        }

        Ok(Self {
            symbol: symbol.to_string(),
            bid,
            ask,
            bid_size,
            ask_size,
            spread: ask - bid,
            timestamp,
        })
    }
}

// ─── Inbound Payloads ─────────────────────────────────────────────────────────

/// Trade print as pushed by the stream bridge. Validated when it reaches the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: String,
    pub price:  f64,
    pub size:   f64,
    /// Missing timestamp = stamped on arrival.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Quote update as pushed by the stream bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteTick {
    pub symbol:   String,
    pub bid:      f64,
    pub ask:      f64,
    #[serde(default)]
    pub bid_size: f64,
    #[serde(default)]
    pub ask_size: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ─── MarketEvent ──────────────────────────────────────────────────────────────

/// Everything the stream can deliver to the orchestrator.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    Trade(TradeTick),
    Quote(QuoteTick),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Trade(t) => &t.symbol,
            MarketEvent::Quote(q) => &q.symbol,
        }
    }

    /// Trim + uppercase the symbol in place ("aapl " → "AAPL").
    pub fn normalize_symbol(&mut self) {
        let symbol = match self {
            MarketEvent::Trade(t) => &mut t.symbol,
            MarketEvent::Quote(q) => &mut q.symbol,
        };
        *symbol = symbol.trim().to_uppercase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_stores_spread_at_insert() {
        let q = Quote::new("AAPL", 100.0, 100.10, 200.0, 300.0, Utc::now()).unwrap();
        assert!((q.spread - 0.10).abs() < 1e-9);
    }

    #[test]
    fn trade_rejects_zero_price_and_size() {
        assert!(matches!(
            Trade::new("AAPL", 0.0, 10.0, Utc::now()),
            Err(InvalidTickError::NonPositivePrice { .. })
        ));
        assert!(matches!(
            Trade::new("AAPL", 10.0, 0.0, Utc::now()),
            Err(InvalidTickError::NonPositiveSize { .. })
        ));
        assert!(matches!(Trade::new(" ", 10.0, 1.0, Utc::now()), Err(InvalidTickError::EmptySymbol)));
    }

    #[test]
    fn quote_rejects_crossed_book() {
        assert!(matches!(
            Quote::new("AAPL", 100.2, 100.0, 1.0, 1.0, Utc::now()),
            Err(InvalidTickError::CrossedQuote { .. })
        ));
        assert!(matches!(
            Quote::new("AAPL", -1.0, 100.0, 1.0, 1.0, Utc::now()),
            Err(InvalidTickError::NegativeBid { .. })
        ));
    }

    #[test]
    fn trade_tick_defaults_timestamp() {
        let tick: TradeTick =
            serde_json::from_str(r#"{"symbol":"SPY","price":501.2,"size":100}"#).unwrap();
        assert_eq!(tick.symbol, "SPY");
        assert!((Utc::now() - tick.timestamp).num_seconds() < 5);
    }
}
