//! # models::position
//!
//! Defines what the brokerage reports about the account and its holdings.
//!
//! ## Why separate from the executor's cache?
//! `BrokerPosition`  = Position ตามที่ Broker รายงาน (authoritative)
//! `Positions`       = cache ฝั่งเรา (symbol → signed qty) ถูกเขียนทับทั้งก้อนทุกครั้งที่ sync
//! `AccountSnapshot` = equity / buying power / P&L ณ เวลาที่ถามล่าสุด

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Local position cache: symbol → signed quantity (positive = long, negative = short).
pub type Positions = HashMap<String, i64>;

// ─── BrokerPosition ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol:           String,
    /// Signed share count.
    pub qty:              i64,
    pub avg_entry_price:  f64,
    pub current_price:    f64,
    pub unrealized_pnl:   f64,
}

// ─── Account ──────────────────────────────────────────────────────────────────

/// Raw account query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id:         String,
    pub equity:             f64,
    pub buying_power:       f64,
    /// Broker has blocked the account from trading today.
    pub trading_blocked:    bool,
    pub pattern_day_trader: bool,
}

/// Equity-side view the executor keeps for risk math.
///
/// `start_of_day_equity` is captured once at startup and anchors every
/// circuit-breaker calculation for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountSnapshot {
    pub equity:              f64,
    pub buying_power:        f64,
    pub daily_pnl:           f64,
    pub start_of_day_equity: f64,
}

// ─── Clock ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketClock {
    pub timestamp:  DateTime<Utc>,
    pub is_open:    bool,
    pub next_open:  DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

impl MarketClock {
    /// Minutes until the next open (0 when already open).
    pub fn minutes_to_open(&self) -> i64 {
        if self.is_open {
            return 0;
        }
        (self.next_open - self.timestamp).num_minutes().max(0)
    }
}

// ─── Latest Quote / Trade ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatestQuote {
    pub bid:      f64,
    pub ask:      f64,
    pub bid_size: f64,
    pub ask_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatestTrade {
    pub price: f64,
    pub size:  f64,
}
