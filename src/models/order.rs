//! # models::order
//!
//! Order-side vocabulary shared by the executor and every [`crate::broker::Broker`]
//! implementation: what we ask the brokerage for ([`OrderRequest`]), what it
//! hands back ([`OrderAck`]) and what we keep for the session ([`OrderRecord`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Side / Type / TIF ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy  => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// Signed effect of a fill on the position: `+1` for buys, `-1` for sells.
    #[inline]
    pub fn sign(&self) -> i64 {
        match self {
            OrderSide::Buy  => 1,
            OrderSide::Sell => -1,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

// ─── Bracket ──────────────────────────────────────────────────────────────────

/// Protective legs attached to an entry order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketLegs {
    pub stop_loss:   f64,
    pub take_profit: f64,
}

impl BracketLegs {
    /// Reward-to-risk as seen from `entry`: `|target − entry| / |entry − stop|`.
    pub fn reward_risk(&self, entry: f64) -> f64 {
        let risk = (entry - self.stop_loss).abs();
        if risk == 0.0 {
            return 0.0;
        }
        (self.take_profit - entry).abs() / risk
    }
}

// ─── Request / Ack ────────────────────────────────────────────────────────────

/// Everything a brokerage needs to place one (possibly compound) order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol:          String,
    pub qty:             u64,
    pub side:            OrderSide,
    pub order_type:      OrderType,
    pub time_in_force:   TimeInForce,
    pub limit_price:     Option<f64>,
    pub bracket:         Option<BracketLegs>,
    pub client_order_id: String,
}

impl OrderRequest {
    /// Client order id in the `"{symbol}_{side}_{unix}"` shape.
    pub fn client_id(symbol: &str, side: OrderSide, at: DateTime<Utc>) -> String {
        format!("{symbol}_{}_{}", side.as_str(), at.timestamp())
    }
}

/// What the brokerage returns for an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub status:   String,
}

// ─── OrderRecord ──────────────────────────────────────────────────────────────

/// Session history entry for every order the executor got accepted.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub order_id:        String,
    pub client_order_id: String,
    pub symbol:          String,
    pub qty:             u64,
    pub side:            OrderSide,
    pub order_type:      OrderType,
    pub limit_price:     Option<f64>,
    pub bracket:         Option<BracketLegs>,
    pub submitted_at:    DateTime<Utc>,
}

impl OrderRecord {
    pub fn from_request(request: &OrderRequest, ack: &OrderAck, at: DateTime<Utc>) -> Self {
        Self {
            order_id:        ack.order_id.clone(),
            client_order_id: request.client_order_id.clone(),
            symbol:          request.symbol.clone(),
            qty:             request.qty,
            side:            request.side,
            order_type:      request.order_type,
            limit_price:     request.limit_price,
            bracket:         request.bracket,
            submitted_at:    at,
        }
    }
}

/// A resting order as listed by the brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub symbol:   String,
    pub side:     OrderSide,
    pub qty:      u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn client_id_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(OrderRequest::client_id("AAPL", OrderSide::Buy, at), "AAPL_buy_1709303400");
    }

    #[test]
    fn reward_risk_is_symmetric_for_shorts() {
        let long  = BracketLegs { stop_loss: 98.0,  take_profit: 106.0 };
        let short = BracketLegs { stop_loss: 102.0, take_profit: 94.0 };
        assert!((long.reward_risk(100.0) - 3.0).abs() < 1e-9);
        assert!((short.reward_risk(100.0) - 3.0).abs() < 1e-9);
    }
}
