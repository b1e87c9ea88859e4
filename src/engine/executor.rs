//! # engine::executor — RiskGatedExecutor
//!
//! ทุก Order ต้องผ่าน pre-trade gate ก่อนถึง Broker
//!
//! ## Gate (ตามลำดับ — ตัวแรกที่ fail ชนะ)
//! 1. ตลาดต้องเปิด (broker clock)
//! 2. `qty × price ≤ equity × max_position_pct`
//! 3. `daily_pnl ≥ −equity × max_daily_loss_pct` (ขาดทุนวันนี้ยังไม่ทะลุเพดาน)
//! 4. `buying_power ≥ qty × price`
//! 5. `qty > 0`
//!
//! Rejection ไม่ใช่ error — คืน [`RiskDecision::Rejected`] / [`SubmitOutcome::Rejected`]
//! ส่วน broker ล่ม คือ [`BrokerError`] แยกกันชัดเจน
//!
//! ## Position cache
//! `sync_positions()` เขียนทับทั้งก้อนจาก broker (ไม่ merge)
//! Order ที่ส่งสำเร็จปรับ cache ทันที (optimistic) จนกว่าจะ sync รอบถัดไป

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::broker::Broker;
use crate::config::RiskConfig;
use crate::error::{BrokerError, StartupError, ValidationError};
use crate::models::{
    Account, AccountSnapshot, BracketLegs, OrderRecord, OrderRequest, OrderSide, OrderType, Positions,
    TimeInForce,
};
use crate::notifier::{Notifier, Priority};

// ─── Outcomes ─────────────────────────────────────────────────────────────────

/// Result of the pre-trade gate.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Rejected(ValidationError),
}

/// Result of an order submission. Only `Submitted` placed anything.
#[derive(Debug)]
pub enum SubmitOutcome {
    Submitted(OrderRecord),
    Rejected(ValidationError),
    Failed(BrokerError),
}

impl SubmitOutcome {
    pub fn record(&self) -> Option<&OrderRecord> {
        match self {
            SubmitOutcome::Submitted(record) => Some(record),
            _ => None,
        }
    }
}

/// What the emergency path managed to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiquidationReport {
    pub orders_cancelled: usize,
    pub positions_closed: usize,
    pub failures:         Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStats {
    pub num_positions:       usize,
    pub positions:           Positions,
    pub daily_pnl:           f64,
    pub start_of_day_equity: Option<f64>,
    pub account:             Option<AccountSnapshot>,
    pub orders_submitted:    usize,
    pub orders_rejected:     u64,
    pub orders_failed:       u64,
}

// ─── RiskGatedExecutor ────────────────────────────────────────────────────────

pub struct RiskGatedExecutor {
    broker:              Arc<dyn Broker>,
    notifier:            Arc<dyn Notifier>,
    risk:                RiskConfig,
    positions:           Positions,
    start_of_day_equity: Option<f64>,
    daily_pnl:           f64,
    last_account:        Option<AccountSnapshot>,
    order_history:       Vec<OrderRecord>,
    orders_rejected:     u64,
    orders_failed:       u64,
}

impl RiskGatedExecutor {
    pub fn new(broker: Arc<dyn Broker>, notifier: Arc<dyn Notifier>, risk: RiskConfig) -> Self {
        Self {
            broker,
            notifier,
            risk,
            positions:           Positions::new(),
            start_of_day_equity: None,
            daily_pnl:           0.0,
            last_account:        None,
            order_history:       Vec::new(),
            orders_rejected:     0,
            orders_failed:       0,
        }
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    // ── Session ───────────────────────────────────────────────────────────────

    /// Startup checks: broker reachable, trading allowed, start-of-day equity
    /// captured, positions loaded.
    pub async fn start_session(&mut self) -> Result<Account, StartupError> {
        let account = self.broker.account().await?;
        if account.trading_blocked {
            return Err(StartupError::TradingBlocked);
        }

        let start = *self.start_of_day_equity.get_or_insert(account.equity);
        self.daily_pnl = account.equity - start;
        self.last_account = Some(self.snapshot(&account));

        self.sync_positions().await?;
        info!(
            equity       = account.equity,
            buying_power = account.buying_power,
            positions    = self.positions.len(),
            "✅ [EXECUTOR] Session started"
        );
        Ok(account)
    }

    fn snapshot(&self, account: &Account) -> AccountSnapshot {
        AccountSnapshot {
            equity:              account.equity,
            buying_power:        account.buying_power,
            daily_pnl:           self.daily_pnl,
            start_of_day_equity: self.start_of_day_equity.unwrap_or(account.equity),
        }
    }

    // ── Pre-trade Gate ────────────────────────────────────────────────────────

    /// Run the five checks in order. `price = None` → latest ask from the broker.
    pub async fn validate(
        &self,
        symbol: &str,
        qty: u64,
        _side: OrderSide,
        price: Option<f64>,
    ) -> Result<RiskDecision, BrokerError> {
        let price = match price {
            Some(p) => p,
            None => match self.current_price(symbol).await {
                Some(p) => p,
                None => {
                    return Ok(RiskDecision::Rejected(ValidationError::PriceUnavailable(
                        symbol.to_string(),
                    )))
                }
            },
        };

        let account = self.broker.account().await?;
        let clock = self.broker.clock().await?;

        // ── 1. Market hours ───────────────────────────────────────────────────
        if !clock.is_open {
            return Ok(RiskDecision::Rejected(ValidationError::MarketClosed));
        }

        // ── 2. Position size ──────────────────────────────────────────────────
        let value = qty as f64 * price;
        let limit = account.equity * self.risk.max_position_pct;
        if value > limit {
            return Ok(RiskDecision::Rejected(ValidationError::ExceedsPositionLimit {
                value,
                limit,
                pct: self.risk.max_position_pct * 100.0,
            }));
        }

        // ── 3. Daily loss ─────────────────────────────────────────────────────
        let floor = self.loss_floor(account.equity);
        if self.daily_pnl < floor {
            return Ok(RiskDecision::Rejected(ValidationError::DailyLossLimit {
                daily_pnl: self.daily_pnl,
                floor,
                pct: self.risk.max_daily_loss_pct * 100.0,
            }));
        }

        // ── 4. Buying power ───────────────────────────────────────────────────
        if account.buying_power < value {
            return Ok(RiskDecision::Rejected(ValidationError::InsufficientBuyingPower {
                available: account.buying_power,
                required:  value,
            }));
        }

        // ── 5. Quantity ───────────────────────────────────────────────────────
        if qty == 0 {
            return Ok(RiskDecision::Rejected(ValidationError::InvalidQuantity(qty)));
        }

        Ok(RiskDecision::Approved)
    }

    /// `−equity × max_daily_loss_pct`
    pub fn loss_floor(&self, equity: f64) -> f64 {
        -equity * self.risk.max_daily_loss_pct
    }

    async fn current_price(&self, symbol: &str) -> Option<f64> {
        match self.broker.latest_quote(symbol).await {
            Ok(q) if q.ask > 0.0 => Some(q.ask),
            Ok(_) => None,
            Err(e) => {
                error!(symbol, error = %e, "Failed to get current price");
                None
            }
        }
    }

    // ── Pricing ───────────────────────────────────────────────────────────────

    /// buy: `bid + spread × aggression` · sell: `ask − spread × aggression`
    pub async fn calculate_limit_price(
        &self,
        symbol: &str,
        side: OrderSide,
        aggression: f64,
    ) -> Result<f64, BrokerError> {
        let quote = self.broker.latest_quote(symbol).await?;
        if quote.bid <= 0.0 || quote.ask < quote.bid {
            return Err(BrokerError::NoData(symbol.to_string()));
        }
        let spread = quote.ask - quote.bid;
        let aggression = aggression.clamp(0.0, 1.0);
        Ok(match side {
            OrderSide::Buy  => quote.bid + spread * aggression,
            OrderSide::Sell => quote.ask - spread * aggression,
        })
    }

    /// Stop / target around `entry` for the given entry side.
    pub fn bracket_levels(&self, entry: f64, side: OrderSide) -> BracketLegs {
        let (sl, tp) = (self.risk.stop_loss_pct, self.risk.take_profit_pct);
        match side {
            OrderSide::Buy => BracketLegs {
                stop_loss:   entry * (1.0 - sl),
                take_profit: entry * (1.0 + tp),
            },
            OrderSide::Sell => BracketLegs {
                stop_loss:   entry * (1.0 + sl),
                take_profit: entry * (1.0 - tp),
            },
        }
    }

    // ── Submission ────────────────────────────────────────────────────────────

    /// Validate, price (limit → market fallback), submit, record.
    pub async fn submit_order(
        &mut self,
        symbol: &str,
        qty: u64,
        side: OrderSide,
        order_type: OrderType,
    ) -> SubmitOutcome {
        let current_price = self.current_price(symbol).await;

        match self.validate(symbol, qty, side, current_price).await {
            Ok(RiskDecision::Approved) => {}
            Ok(RiskDecision::Rejected(reason)) => return self.rejected(symbol, reason),
            Err(e) => return self.failed(symbol, "Order error", e),
        }

        let (order_type, limit_price) = match order_type {
            OrderType::Market => (OrderType::Market, None),
            OrderType::Limit => {
                match self.calculate_limit_price(symbol, side, self.risk.limit_aggression).await {
                    Ok(price) => (OrderType::Limit, Some(round_cents(price))),
                    Err(e) => {
                        warn!(symbol, error = %e, "Could not calculate limit price, falling back to market order");
                        (OrderType::Market, None)
                    }
                }
            }
        };

        let request = OrderRequest {
            symbol:          symbol.to_string(),
            qty,
            side,
            order_type,
            time_in_force:   TimeInForce::Day,
            limit_price,
            bracket:         None,
            client_order_id: OrderRequest::client_id(symbol, side, Utc::now()),
        };

        let outcome = self.place(request, "Order error").await;
        if let SubmitOutcome::Submitted(record) = &outcome {
            let at = match (record.limit_price, current_price) {
                (Some(p), _) | (None, Some(p)) => format!("${p:.2}"),
                (None, None) => "market".to_string(),
            };
            self.notifier.notify(
                &format!("Order: {side} {qty} {symbol} @ {at}"),
                Priority::Low,
            );
        }
        outcome
    }

    /// Limit entry at `entry_price` carrying stop-loss and take-profit legs.
    pub async fn submit_bracket_order(
        &mut self,
        symbol: &str,
        qty: u64,
        side: OrderSide,
        entry_price: f64,
    ) -> SubmitOutcome {
        match self.validate(symbol, qty, side, Some(entry_price)).await {
            Ok(RiskDecision::Approved) => {}
            Ok(RiskDecision::Rejected(reason)) => return self.rejected(symbol, reason),
            Err(e) => return self.failed(symbol, "Bracket order error", e),
        }

        let legs = self.bracket_levels(entry_price, side);
        let request = OrderRequest {
            symbol:          symbol.to_string(),
            qty,
            side,
            order_type:      OrderType::Limit,
            time_in_force:   TimeInForce::Day,
            limit_price:     Some(round_cents(entry_price)),
            bracket:         Some(BracketLegs {
                stop_loss:   round_cents(legs.stop_loss),
                take_profit: round_cents(legs.take_profit),
            }),
            client_order_id: OrderRequest::client_id(symbol, side, Utc::now()),
        };

        let outcome = self.place(request, "Bracket order error").await;
        if outcome.record().is_some() {
            info!(
                symbol,
                %side,
                qty,
                entry = entry_price,
                sl    = legs.stop_loss,
                tp    = legs.take_profit,
                rr    = legs.reward_risk(entry_price),
                "🎯 [EXECUTOR] Bracket order placed"
            );
            self.notifier.notify(
                &format!(
                    "Bracket: {side} {qty} {symbol}\nEntry: ${entry_price:.2}\nStop: ${:.2}\nTarget: ${:.2}",
                    legs.stop_loss, legs.take_profit
                ),
                Priority::Low,
            );
        }
        outcome
    }

    async fn place(&mut self, request: OrderRequest, failure_label: &str) -> SubmitOutcome {
        match self.broker.submit_order(&request).await {
            Ok(ack) => {
                let record = OrderRecord::from_request(&request, &ack, Utc::now());
                *self.positions.entry(request.symbol.clone()).or_insert(0) +=
                    request.qty as i64 * request.side.sign();
                self.positions.retain(|_, qty| *qty != 0);

                info!(
                    order_id = %record.order_id,
                    symbol   = %record.symbol,
                    side     = %record.side,
                    qty      = record.qty,
                    limit    = ?record.limit_price,
                    status   = %ack.status,
                    "✅ [EXECUTOR] Order submitted"
                );
                self.order_history.push(record.clone());
                SubmitOutcome::Submitted(record)
            }
            Err(e) => self.failed(&request.symbol, failure_label, e),
        }
    }

    fn rejected(&mut self, symbol: &str, reason: ValidationError) -> SubmitOutcome {
        self.orders_rejected += 1;
        warn!(symbol, %reason, "⛔ [EXECUTOR] Order validation failed");
        self.notifier.notify(&format!("Order rejected: {reason}"), Priority::Medium);
        SubmitOutcome::Rejected(reason)
    }

    fn failed(&mut self, symbol: &str, label: &str, error: BrokerError) -> SubmitOutcome {
        self.orders_failed += 1;
        error!(symbol, error = %error, "❌ [EXECUTOR] Order submission failed");
        self.notifier.notify(&format!("{label}: {error}"), Priority::High);
        SubmitOutcome::Failed(error)
    }

    // ── Position / P&L ────────────────────────────────────────────────────────

    /// Replace the local cache wholesale with the broker's list.
    pub async fn sync_positions(&mut self) -> Result<(), BrokerError> {
        match self.broker.positions().await {
            Ok(list) => {
                self.positions = list.into_iter().map(|p| (p.symbol, p.qty)).collect();
                info!(count = self.positions.len(), "🔄 Synced positions from broker");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to sync positions");
                self.notifier.notify(&format!("Position sync failed: {e}"), Priority::High);
                Err(e)
            }
        }
    }

    /// `daily_pnl = equity − start_of_day_equity`
    pub async fn update_daily_pnl(&mut self) -> Result<AccountSnapshot, BrokerError> {
        let account = self.broker.account().await.map_err(|e| {
            error!(error = %e, "Failed to update P&L");
            e
        })?;
        let start = *self.start_of_day_equity.get_or_insert(account.equity);
        self.daily_pnl = account.equity - start;

        let snapshot = self.snapshot(&account);
        self.last_account = Some(snapshot);
        Ok(snapshot)
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn start_of_day_equity(&self) -> Option<f64> {
        self.start_of_day_equity
    }

    pub fn last_account(&self) -> Option<AccountSnapshot> {
        self.last_account
    }

    pub fn position(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn order_history(&self) -> &[OrderRecord] {
        &self.order_history
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            num_positions:       self.positions.len(),
            positions:           self.positions.clone(),
            daily_pnl:           self.daily_pnl,
            start_of_day_equity: self.start_of_day_equity,
            account:             self.last_account,
            orders_submitted:    self.order_history.len(),
            orders_rejected:     self.orders_rejected,
            orders_failed:       self.orders_failed,
        }
    }

    // ── Emergency Path ────────────────────────────────────────────────────────

    /// Cancel open orders, optionally only for `symbol`. Best-effort per order.
    pub async fn cancel_all_orders(&mut self, symbol: Option<&str>) -> Result<usize, BrokerError> {
        let open = match self.broker.list_open_orders().await {
            Ok(open) => open,
            Err(e) => {
                error!(error = %e, "Failed to list open orders");
                self.notifier.notify(&format!("Cancel orders failed: {e}"), Priority::High);
                return Err(e);
            }
        };

        let mut cancelled = 0;
        for order in open.iter().filter(|o| symbol.map_or(true, |s| o.symbol == s)) {
            match self.broker.cancel_order(&order.order_id).await {
                Ok(()) => {
                    cancelled += 1;
                    info!(symbol = %order.symbol, side = %order.side, qty = order.qty, "Cancelled order");
                }
                Err(e) => {
                    error!(order_id = %order.order_id, error = %e, "Failed to cancel order");
                    self.notifier.notify(
                        &format!("Cancel failed for {} ({}): {e}", order.symbol, order.order_id),
                        Priority::High,
                    );
                }
            }
        }

        info!(cancelled, "🧹 Cancelled open orders");
        self.notifier.notify(&format!("Cancelled {cancelled} orders"), Priority::Medium);
        Ok(cancelled)
    }

    /// Flatten everything at market. Best-effort per position.
    pub async fn close_all_positions(&mut self) -> Result<usize, BrokerError> {
        let held = match self.broker.positions().await {
            Ok(held) => held,
            Err(e) => {
                error!(error = %e, "Failed to close positions");
                self.notifier.notify(&format!("Liquidation error: {e}"), Priority::Critical);
                return Err(e);
            }
        };

        let mut closed = 0;
        let mut failures = Vec::new();
        for position in &held {
            match self.broker.close_position(&position.symbol).await {
                Ok(()) => {
                    closed += 1;
                    self.positions.remove(&position.symbol);
                    info!(symbol = %position.symbol, qty = position.qty, "Closed position");
                }
                Err(e) => {
                    error!(symbol = %position.symbol, error = %e, "Failed to close position");
                    failures.push(format!("{}: {e}", position.symbol));
                }
            }
        }

        self.notifier.notify(&format!("Liquidated {closed} positions"), Priority::High);
        if !failures.is_empty() {
            self.notifier.notify(
                &format!("Liquidation incomplete: {}", failures.join(", ")),
                Priority::Critical,
            );
        }
        Ok(closed)
    }

    /// Circuit breaker / kill switch: cancel everything, then go flat.
    pub async fn emergency_liquidate(&mut self) -> LiquidationReport {
        let mut report = LiquidationReport::default();

        match self.cancel_all_orders(None).await {
            Ok(n) => report.orders_cancelled = n,
            Err(e) => report.failures.push(format!("cancel orders: {e}")),
        }
        match self.close_all_positions().await {
            Ok(n) => report.positions_closed = n,
            Err(e) => report.failures.push(format!("close positions: {e}")),
        }

        warn!(
            cancelled = report.orders_cancelled,
            closed    = report.positions_closed,
            failures  = report.failures.len(),
            "🛑 [EXECUTOR] Emergency liquidation finished"
        );
        report
    }
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

// ─── Tests ────────────────────────────────────────────────────────────────────
