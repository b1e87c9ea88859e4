//! # broker::paper — PaperBroker
//!
//! In-memory brokerage สำหรับ `BROKER_MODE=paper` และ tests
//!
//! - Order fill ทันที: limit → ที่ limit price, market → ที่ราคา mark ล่าสุด
//! - Bracket legs (stop / target) ค้างเป็น open orders จนกว่าจะถูก cancel
//! - ราคา mark / quote อัปเดตจาก MarketFeed (implements [`MarketTap`])
//! - `equity = cash + Σ qty × mark`, `buying_power = cash`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::feed::MarketTap;
use crate::models::{
    Account, BrokerPosition, LatestQuote, LatestTrade, MarketClock, MarketEvent, OpenOrder, OrderAck,
    OrderRequest, OrderSide,
};

#[derive(Debug, Clone, Copy)]
struct PaperPosition {
    qty:       i64,
    avg_entry: f64,
}

#[derive(Debug)]
struct Book {
    cash:               f64,
    positions:          HashMap<String, PaperPosition>,
    trades:             HashMap<String, LatestTrade>,
    quotes:             HashMap<String, LatestQuote>,
    open_orders:        Vec<OpenOrder>,
    next_id:            u64,
    market_open:        bool,
    trading_blocked:    bool,
    pattern_day_trader: bool,
    offline:            bool,
}

impl Book {
    fn mark(&self, symbol: &str) -> Option<f64> {
        self.trades.get(symbol).map(|t| t.price)
    }

    fn equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .iter()
                .map(|(symbol, p)| p.qty as f64 * self.mark(symbol).unwrap_or(p.avg_entry))
                .sum::<f64>()
    }

    fn next_order_id(&mut self) -> String {
        self.next_id += 1;
        format!("paper-{:06}", self.next_id)
    }

    /// Apply a signed fill to cash and the position book.
    fn apply_fill(&mut self, symbol: &str, signed_qty: i64, price: f64) {
        self.cash -= signed_qty as f64 * price;

        let pos = self
            .positions
            .entry(symbol.to_string())
            .or_insert(PaperPosition { qty: 0, avg_entry: price });
        let new_qty = pos.qty + signed_qty;

        if pos.qty == 0 || pos.qty.signum() == signed_qty.signum() {
            let cost = pos.avg_entry * pos.qty.abs() as f64 + price * signed_qty.abs() as f64;
            pos.avg_entry = cost / new_qty.abs() as f64;
        } else if new_qty.signum() == -pos.qty.signum() {
            // flipped through flat: remainder opened at the fill price
            pos.avg_entry = price;
        }
        pos.qty = new_qty;

        if new_qty == 0 {
            self.positions.remove(symbol);
        }
    }

    fn ensure_online(&self) -> Result<(), BrokerError> {
        if self.offline {
            return Err(BrokerError::Transport("paper broker is offline".into()));
        }
        Ok(())
    }
}

// ─── PaperBroker ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PaperBroker {
    book: RwLock<Book>,
}

impl PaperBroker {
    pub fn new(starting_cash: f64) -> Self {
        Self {
            book: RwLock::new(Book {
                cash:               starting_cash,
                positions:          HashMap::new(),
                trades:             HashMap::new(),
                quotes:             HashMap::new(),
                open_orders:        Vec::new(),
                next_id:            0,
                market_open:        true,
                trading_blocked:    false,
                pattern_day_trader: false,
                offline:            false,
            }),
        }
    }

    // ── Controls ──────────────────────────────────────────────────────────────

    pub async fn set_market_open(&self, open: bool) {
        self.book.write().await.market_open = open;
    }

    pub async fn set_trading_blocked(&self, blocked: bool) {
        self.book.write().await.trading_blocked = blocked;
    }

    pub async fn set_pattern_day_trader(&self, pdt: bool) {
        self.book.write().await.pattern_day_trader = pdt;
    }

    /// Every call fails with a transport error while offline.
    pub async fn set_offline(&self, offline: bool) {
        self.book.write().await.offline = offline;
    }

    /// Adopt an existing holding without touching cash.
    pub async fn seed_position(&self, symbol: &str, qty: i64, avg_entry: f64) {
        let mut book = self.book.write().await;
        book.positions.insert(symbol.to_string(), PaperPosition { qty, avg_entry });
        book.trades
            .entry(symbol.to_string())
            .or_insert(LatestTrade { price: avg_entry, size: 0.0 });
    }

    pub async fn set_mark(&self, symbol: &str, price: f64) {
        self.book
            .write()
            .await
            .trades
            .insert(symbol.to_string(), LatestTrade { price, size: 0.0 });
    }

    pub async fn set_quote(&self, symbol: &str, bid: f64, ask: f64) {
        self.book.write().await.quotes.insert(
            symbol.to_string(),
            LatestQuote { bid, ask, bid_size: 100.0, ask_size: 100.0 },
        );
    }

    pub async fn cash(&self) -> f64 {
        self.book.read().await.cash
    }
}

// ─── MarketTap ────────────────────────────────────────────────────────────────

#[async_trait]
impl MarketTap for PaperBroker {
    async fn on_event(&self, event: &MarketEvent) {
        let mut book = self.book.write().await;
        match event {
            MarketEvent::Trade(t) => {
                book.trades.insert(t.symbol.clone(), LatestTrade { price: t.price, size: t.size });
            }
            MarketEvent::Quote(q) => {
                book.quotes.insert(
                    q.symbol.clone(),
                    LatestQuote { bid: q.bid, ask: q.ask, bid_size: q.bid_size, ask_size: q.ask_size },
                );
            }
        }
    }
}

// ─── Broker ───────────────────────────────────────────────────────────────────

#[async_trait]
impl Broker for PaperBroker {
    async fn account(&self) -> Result<Account, BrokerError> {
        let book = self.book.read().await;
        book.ensure_online()?;
        Ok(Account {
            account_id:         "paper".to_string(),
            equity:             book.equity(),
            buying_power:       book.cash.max(0.0),
            trading_blocked:    book.trading_blocked,
            pattern_day_trader: book.pattern_day_trader,
        })
    }

    async fn clock(&self) -> Result<MarketClock, BrokerError> {
        let book = self.book.read().await;
        book.ensure_online()?;
        let now = Utc::now();
        Ok(MarketClock {
            timestamp:  now,
            is_open:    book.market_open,
            next_open:  if book.market_open { now + Duration::days(1) } else { now + Duration::hours(1) },
            next_close: now + Duration::minutes(390),
        })
    }

    async fn latest_quote(&self, symbol: &str) -> Result<LatestQuote, BrokerError> {
        let book = self.book.read().await;
        book.ensure_online()?;
        book.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::NoData(symbol.to_string()))
    }

    async fn latest_trade(&self, symbol: &str) -> Result<LatestTrade, BrokerError> {
        let book = self.book.read().await;
        book.ensure_online()?;
        book.trades
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::NoData(symbol.to_string()))
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let book = self.book.read().await;
        book.ensure_online()?;
        let mut out: Vec<BrokerPosition> = book
            .positions
            .iter()
            .map(|(symbol, p)| {
                let current_price = book.mark(symbol).unwrap_or(p.avg_entry);
                BrokerPosition {
                    symbol:          symbol.clone(),
                    qty:             p.qty,
                    avg_entry_price: p.avg_entry,
                    current_price,
                    unrealized_pnl:  (current_price - p.avg_entry) * p.qty as f64,
                }
            })
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(out)
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let mut book = self.book.write().await;
        book.ensure_online()?;

        if request.qty == 0 {
            return Err(BrokerError::Rejected("qty must be > 0".into()));
        }
        let price = match request.limit_price {
            Some(limit) => limit,
            None => book
                .mark(&request.symbol)
                .ok_or_else(|| BrokerError::NoData(request.symbol.clone()))?,
        };

        let notional = request.qty as f64 * price;
        if request.side == OrderSide::Buy && notional > book.cash {
            return Err(BrokerError::Rejected(format!(
                "insufficient buying power: ${:.2} < ${notional:.2}",
                book.cash
            )));
        }

        let signed = request.qty as i64 * request.side.sign();
        book.apply_fill(&request.symbol, signed, price);

        // ── Bracket legs rest on the opposite side ────────────────────────────
        if request.bracket.is_some() {
            let exit_side = match request.side {
                OrderSide::Buy  => OrderSide::Sell,
                OrderSide::Sell => OrderSide::Buy,
            };
            for _ in 0..2 {
                let order_id = book.next_order_id();
                book.open_orders.push(OpenOrder {
                    order_id,
                    symbol: request.symbol.clone(),
                    side:   exit_side,
                    qty:    request.qty,
                });
            }
        }

        let order_id = book.next_order_id();
        debug!(
            order_id = %order_id,
            symbol   = %request.symbol,
            side     = %request.side,
            qty      = request.qty,
            price,
            "📄 [PAPER] Filled"
        );
        Ok(OrderAck { order_id, status: "filled".to_string() })
    }

    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>, BrokerError> {
        let book = self.book.read().await;
        book.ensure_online()?;
        Ok(book.open_orders.clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let mut book = self.book.write().await;
        book.ensure_online()?;
        let before = book.open_orders.len();
        book.open_orders.retain(|o| o.order_id != order_id);
        if book.open_orders.len() == before {
            return Err(BrokerError::Rejected(format!("order {order_id} not found")));
        }
        Ok(())
    }

    async fn cancel_all_orders(&self) -> Result<usize, BrokerError> {
        let mut book = self.book.write().await;
        book.ensure_online()?;
        let cancelled = book.open_orders.len();
        book.open_orders.clear();
        Ok(cancelled)
    }

    async fn close_position(&self, symbol: &str) -> Result<(), BrokerError> {
        let mut book = self.book.write().await;
        book.ensure_online()?;
        let Some(pos) = book.positions.get(symbol).copied() else {
            return Err(BrokerError::Rejected(format!("no position in {symbol}")));
        };
        let price = book.mark(symbol).unwrap_or(pos.avg_entry);
        book.apply_fill(symbol, -pos.qty, price);
        info!(symbol, qty = pos.qty, price, "📄 [PAPER] Position closed");
        Ok(())
    }

    async fn close_all_positions(&self) -> Result<usize, BrokerError> {
        let symbols: Vec<String> = {
            let book = self.book.read().await;
            book.ensure_online()?;
            book.positions.keys().cloned().collect()
        };
        for symbol in &symbols {
            self.close_position(symbol).await?;
        }
        Ok(symbols.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BracketLegs, OrderType, TimeInForce, TradeTick};

    fn order(symbol: &str, side: OrderSide, qty: u64, limit: Option<f64>) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            qty,
            side,
            order_type: if limit.is_some() { OrderType::Limit } else { OrderType::Market },
            time_in_force: TimeInForce::Day,
            limit_price: limit,
            bracket: None,
            client_order_id: OrderRequest::client_id(symbol, side, Utc::now()),
        }
    }

    #[tokio::test]
    async fn fills_move_cash_and_positions() {
        let broker = PaperBroker::new(100_000.0);
        broker.set_mark("AAPL", 100.0).await;

        broker.submit_order(&order("AAPL", OrderSide::Buy, 50, Some(100.0))).await.unwrap();
        assert_eq!(broker.cash().await, 95_000.0);

        broker.set_mark("AAPL", 110.0).await;
        let account = broker.account().await.unwrap();
        assert_eq!(account.equity, 100_500.0);
        assert_eq!(account.buying_power, 95_000.0);

        let positions = broker.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].qty, 50);
        assert_eq!(positions[0].unrealized_pnl, 500.0);

        broker.submit_order(&order("AAPL", OrderSide::Sell, 50, None)).await.unwrap();
        assert!(broker.positions().await.unwrap().is_empty());
        assert_eq!(broker.cash().await, 100_500.0);
    }

    #[tokio::test]
    async fn averages_entry_on_adds() {
        let broker = PaperBroker::new(100_000.0);
        broker.submit_order(&order("MSFT", OrderSide::Buy, 10, Some(100.0))).await.unwrap();
        broker.submit_order(&order("MSFT", OrderSide::Buy, 30, Some(200.0))).await.unwrap();
        let pos = &broker.positions().await.unwrap()[0];
        assert_eq!(pos.qty, 40);
        assert_eq!(pos.avg_entry_price, 175.0);
    }

    #[tokio::test]
    async fn bracket_legs_rest_until_cancelled() {
        let broker = PaperBroker::new(100_000.0);
        let mut request = order("AAPL", OrderSide::Buy, 10, Some(100.0));
        request.bracket = Some(BracketLegs { stop_loss: 98.0, take_profit: 106.0 });
        broker.submit_order(&request).await.unwrap();

        let open = broker.list_open_orders().await.unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|o| o.side == OrderSide::Sell && o.qty == 10));

        broker.cancel_order(&open[0].order_id).await.unwrap();
        assert_eq!(broker.cancel_all_orders().await.unwrap(), 1);
        assert!(broker.cancel_order("nope").await.is_err());
    }

    #[tokio::test]
    async fn rejects_unaffordable_and_unpriced_orders() {
        let broker = PaperBroker::new(1_000.0);
        let err = broker.submit_order(&order("AAPL", OrderSide::Buy, 100, Some(100.0))).await;
        assert!(matches!(err, Err(BrokerError::Rejected(_))));

        let err = broker.submit_order(&order("AAPL", OrderSide::Buy, 1, None)).await;
        assert!(matches!(err, Err(BrokerError::NoData(_))));
    }

    #[tokio::test]
    async fn seeded_positions_close_at_mark() {
        let broker = PaperBroker::new(10_000.0);
        broker.seed_position("TSLA", 10, 200.0).await;
        broker.seed_position("NVDA", -5, 400.0).await;
        broker.set_mark("TSLA", 210.0).await;

        assert_eq!(broker.close_all_positions().await.unwrap(), 2);
        assert!(broker.positions().await.unwrap().is_empty());
        // +10 × 210 from TSLA, −5 × 400 to cover NVDA
        assert_eq!(broker.cash().await, 10_100.0);
    }

    #[tokio::test]
    async fn feed_events_update_marks_and_quotes() {
        let broker = PaperBroker::new(10_000.0);
        let tick = TradeTick { symbol: "SPY".into(), price: 501.0, size: 10.0, timestamp: Utc::now() };
        broker.on_event(&MarketEvent::Trade(tick)).await;
        assert_eq!(broker.latest_trade("SPY").await.unwrap().price, 501.0);
        assert!(matches!(broker.latest_quote("SPY").await, Err(BrokerError::NoData(_))));
    }

    #[tokio::test]
    async fn offline_broker_fails_with_transport_error() {
        let broker = PaperBroker::new(10_000.0);
        broker.set_offline(true).await;
        assert!(matches!(broker.account().await, Err(BrokerError::Transport(_))));
        assert!(matches!(broker.close_all_positions().await, Err(BrokerError::Transport(_))));
    }
}
