//! # engine::orchestrator — Session lifecycle
//!
//! เจ้าของ TickCache, Strategy และ Executor แต่เพียงผู้เดียว (single writer)
//! ทุกอย่างที่แก้ state วิ่งผ่าน `select!` loop เดียว จึงไม่ต้องมี lock
//!
//! ```text
//! STARTUP ──▶ WAITING_FOR_OPEN ──▶ RUNNING ──┬──▶ GRACEFUL_SHUTDOWN  ──┐
//!   │ fail          │ shutdown/kill          └──▶ EMERGENCY_SHUTDOWN ──┴──▶ STOPPED
//!   └──▶ STOPPED    └──▶ (shutdown path)
//! ```
//!
//! ## Inputs
//! * `market_rx`  — Trade/Quote จาก [`MarketFeed`] (เฉพาะ symbol ที่ subscribe)
//! * `control_rx` — [`ControlCommand`] จาก HTTP / Ctrl-C
//! * timers       — position sync · P&L check · health check · market close
//!
//! ## Outputs
//! * `watch::Sender<BotStatus>`   — snapshot ล่าสุดสำหรับ dashboard
//! * `broadcast::Sender<String>`  — [`BotEvent`] JSON ไปยัง `/ws/monitor`

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::cache::TickCache;
use crate::config::{Config, ScheduleConfig, StrategyConfig};
use crate::engine::executor::{RiskGatedExecutor, SubmitOutcome};
use crate::engine::strategy::{build_strategy, BoxedStrategy};
use crate::error::StartupError;
use crate::events::BotEvent;
use crate::feed::MarketFeed;
use crate::models::{
    Action, BotState, BotStatus, MarketEvent, OrderSide, OrderType, QuoteTick, SessionSummary, Signal,
    TradeTick,
};
use crate::notifier::{Notifier, Priority};

/// PDT rule: margin accounts below this equity get 3 day trades per 5 days.
const PDT_MIN_EQUITY: f64 = 25_000.0;

/// Quote spread (as % of bid) above which a warning is logged.
const WIDE_SPREAD_PCT: f64 = 0.5;

// ─── Control ──────────────────────────────────────────────────────────────────

/// Operator commands delivered over the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Cancel open orders, keep positions, stop.
    Shutdown,
    /// Cancel everything and flatten every position.
    KillSwitch { reason: String },
}

/// How the session is leaving RUNNING (or WAITING_FOR_OPEN).
#[derive(Debug, Clone, PartialEq)]
enum Exit {
    Graceful(String),
    Emergency(String),
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

pub struct Orchestrator {
    strategy_cfg:  StrategyConfig,
    schedule:      ScheduleConfig,
    subscriptions: Vec<String>,
    cache:         TickCache,
    strategy:      BoxedStrategy,
    executor:      RiskGatedExecutor,
    broker:        Arc<dyn Broker>,
    feed:          Arc<MarketFeed>,
    notifier:      Arc<dyn Notifier>,
    broadcast_tx:  broadcast::Sender<String>,
    status_tx:     watch::Sender<BotStatus>,
    status:        BotStatus,
    control_open:  bool,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        broker: Arc<dyn Broker>,
        feed: Arc<MarketFeed>,
        notifier: Arc<dyn Notifier>,
        broadcast_tx: broadcast::Sender<String>,
    ) -> (Self, watch::Receiver<BotStatus>) {
        let strategy = build_strategy(&config.strategy, &config.risk);
        let status = BotStatus::new(strategy.name());
        let (status_tx, status_rx) = watch::channel(status.clone());

        let orchestrator = Self {
            strategy_cfg:  config.strategy.clone(),
            schedule:      config.schedule.clone(),
            subscriptions: config.subscriptions(),
            cache:         TickCache::new(config.cache_window_size),
            strategy,
            executor:      RiskGatedExecutor::new(broker.clone(), notifier.clone(), config.risk.clone()),
            broker,
            feed,
            notifier,
            broadcast_tx,
            status_tx,
            status,
            control_open:  true,
        };
        (orchestrator, status_rx)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Drive one trading session to STOPPED.
    ///
    /// Returns `Err` only when startup fails; every later failure ends in a
    /// shutdown path and a [`SessionSummary`].
    pub async fn run(
        mut self,
        mut market_rx: mpsc::Receiver<MarketEvent>,
        mut control_rx: mpsc::Receiver<ControlCommand>,
    ) -> Result<SessionSummary, StartupError> {
        // ── 1. STARTUP ───────────────────────────────────────────────────────
        if let Err(e) = self.startup().await {
            error!(error = %e, "❌ Startup failed");
            self.notifier.notify(&format!("Startup failed: {e}"), Priority::Critical);
            self.transition(BotState::Stopped);
            return Err(e);
        }

        // ── 2. WAITING_FOR_OPEN ──────────────────────────────────────────────
        self.transition(BotState::WaitingForOpen);
        let exit = match self.wait_for_open(&mut control_rx).await {
            Some(exit) => exit,
            None => {
                // ── 3. RUNNING ───────────────────────────────────────────────
                self.feed.subscribe(&self.subscriptions).await;
                self.transition(BotState::Running);
                self.notifier.notify("Market opened - bot is active", Priority::Low);

                let exit = self.trading_loop(&mut market_rx, &mut control_rx).await;
                self.feed.unsubscribe_all().await;
                exit
            }
        };

        // ── 4. SHUTDOWN ──────────────────────────────────────────────────────
        let summary = match exit {
            Exit::Graceful(reason) => self.graceful_shutdown(reason).await,
            Exit::Emergency(reason) => self.emergency_shutdown(reason).await,
        };
        self.transition(BotState::Stopped);
        Ok(summary)
    }

    async fn startup(&mut self) -> Result<(), StartupError> {
        info!(
            session  = %self.status.session_id,
            strategy = self.strategy.name(),
            "🚀 TRADING BOT STARTUP"
        );

        let account = self.executor.start_session().await?;
        info!(
            account      = %account.account_id,
            equity       = account.equity,
            buying_power = account.buying_power,
            "💰 Account loaded"
        );

        if account.pattern_day_trader && account.equity < PDT_MIN_EQUITY {
            warn!(equity = account.equity, "⚠️  Pattern Day Trader with <$25k equity - limited to 3 day trades per 5 days");
            self.notifier.notify(
                "Pattern Day Trader with <$25k equity - limited to 3 day trades per 5 days",
                Priority::Medium,
            );
        }

        self.notifier.notify(
            &format!(
                "Trading bot started\nStrategy: {}\nEquity: ${:.2}\nPositions: {}",
                self.strategy.name(),
                account.equity,
                self.executor.positions().len(),
            ),
            Priority::Low,
        );
        info!(watchlist = ?self.subscriptions, "✅ Startup complete");
        self.publish_status();
        Ok(())
    }

    /// Poll the broker clock until the market opens.
    /// `Some(exit)` when an operator command ends the session first.
    async fn wait_for_open(&mut self, control_rx: &mut mpsc::Receiver<ControlCommand>) -> Option<Exit> {
        loop {
            match self.broker.clock().await {
                Ok(clock) if clock.is_open => return None,
                Ok(clock) => info!(
                    minutes_to_open = clock.minutes_to_open(),
                    "⏳ Market closed. Opens in {} minutes",
                    clock.minutes_to_open()
                ),
                Err(e) => {
                    error!(error = %e, "Error checking market status");
                    self.notifier.notify(&format!("Error checking market status: {e}"), Priority::High);
                }
            }

            tokio::select! {
                biased;
                cmd = control_rx.recv(), if self.control_open => match cmd {
                    Some(cmd) => return Some(self.on_control(cmd)),
                    None => self.control_open = false,
                },
                _ = tokio::time::sleep(self.schedule.market_poll) => {}
            }
        }
    }

    async fn trading_loop(
        &mut self,
        market_rx: &mut mpsc::Receiver<MarketEvent>,
        control_rx: &mut mpsc::Receiver<ControlCommand>,
    ) -> Exit {
        let now = Instant::now();
        let timer = |period: Duration| {
            let mut t = interval_at(now + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        };
        let mut pnl_timer = timer(self.schedule.pnl_check);
        let mut close_timer = timer(self.schedule.market_poll);
        let mut sync_timer = timer(self.schedule.position_sync);
        let mut health_timer = timer(self.schedule.health_check);

        info!("🏁 Trading loop started");
        loop {
            let exit = tokio::select! {
                biased;

                // control first: a kill switch must not queue behind ticks
                cmd = control_rx.recv(), if self.control_open => match cmd {
                    Some(cmd) => Some(self.on_control(cmd)),
                    None => {
                        self.control_open = false;
                        None
                    }
                },

                _ = pnl_timer.tick() => {
                    if self.check_pnl().await {
                        Some(Exit::Emergency("circuit breaker".to_string()))
                    } else {
                        None
                    }
                }

                _ = close_timer.tick() => self.check_market_close().await,

                _ = sync_timer.tick() => {
                    self.sync_positions().await;
                    None
                }

                _ = health_timer.tick() => {
                    self.health_check();
                    None
                }

                event = market_rx.recv() => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                        None
                    }
                    None => Some(Exit::Graceful("market feed closed".to_string())),
                },
            };

            self.publish_status();
            if let Some(exit) = exit {
                return exit;
            }
        }
    }

    fn on_control(&mut self, cmd: ControlCommand) -> Exit {
        match cmd {
            ControlCommand::Shutdown => {
                info!("🛑 Shutdown requested");
                Exit::Graceful("shutdown requested".to_string())
            }
            ControlCommand::KillSwitch { reason } => {
                error!(%reason, "🚨 KILL SWITCH");
                self.notifier.notify(&format!("KILL SWITCH: {reason}"), Priority::Critical);
                Exit::Emergency(format!("kill switch: {reason}"))
            }
        }
    }

    // ── Market Events ─────────────────────────────────────────────────────────

    pub async fn handle_event(&mut self, event: MarketEvent) -> Option<SubmitOutcome> {
        match event {
            MarketEvent::Trade(tick) => self.handle_trade(tick).await,
            MarketEvent::Quote(tick) => {
                self.handle_quote(tick);
                None
            }
        }
    }

    /// Cache → evaluate → (maybe) trade.
    async fn handle_trade(&mut self, tick: TradeTick) -> Option<SubmitOutcome> {
        if let Err(e) = self.cache.add_trade(&tick.symbol, tick.price, tick.size, tick.timestamp) {
            warn!(symbol = %tick.symbol, error = %e, "Invalid trade dropped");
            return None;
        }
        self.status.trades_processed += 1;
        self.status.last_tick_at = Some(Utc::now());
        self.refresh_cache_stats(&tick.symbol);

        let signal = self.strategy.evaluate(&tick.symbol, &self.cache);
        self.status.signals_evaluated += 1;
        debug!(
            symbol     = %signal.symbol,
            action     = %signal.action,
            confidence = signal.confidence,
            reason     = %signal.reason,
            "Signal evaluated"
        );

        if !signal.is_actionable() {
            return None;
        }
        self.handle_signal(signal, tick.price).await
    }

    fn handle_quote(&mut self, tick: QuoteTick) {
        if let Err(e) = self.cache.add_quote(
            &tick.symbol,
            tick.bid,
            tick.ask,
            tick.bid_size,
            tick.ask_size,
            tick.timestamp,
        ) {
            warn!(symbol = %tick.symbol, error = %e, "Invalid quote dropped");
            return;
        }
        self.status.quotes_processed += 1;
        self.status.last_tick_at = Some(Utc::now());

        if tick.bid > 0.0 {
            let spread_pct = (tick.ask - tick.bid) / tick.bid * 100.0;
            if spread_pct > WIDE_SPREAD_PCT {
                warn!(symbol = %tick.symbol, spread_pct, "⚠️  Wide spread: {spread_pct:.2}%");
                self.status.wide_spreads += 1;
            }
        }
        self.refresh_cache_stats(&tick.symbol);
    }

    /// Gate an actionable signal and turn it into an order.
    ///
    /// BUY opens a bracket at `price` only when flat or short.
    /// SELL closes the whole long position with a limit order.
    pub async fn handle_signal(&mut self, signal: Signal, price: f64) -> Option<SubmitOutcome> {
        let threshold = self.strategy_cfg.confidence_threshold;
        if signal.confidence < threshold {
            info!(
                symbol     = %signal.symbol,
                confidence = signal.confidence,
                threshold,
                "Signal ignored - low confidence"
            );
            return None;
        }

        let position = self.executor.position(&signal.symbol);
        match signal.action {
            Action::Hold => return None,
            Action::Buy if position > 0 => {
                info!(symbol = %signal.symbol, position, "BUY signal ignored - already long");
                return None;
            }
            Action::Sell if position <= 0 => {
                info!(symbol = %signal.symbol, "SELL signal ignored - no position to sell");
                return None;
            }
            _ => {}
        }

        let equity = match self.broker.account().await {
            Ok(account) => account.equity,
            Err(e) => {
                error!(symbol = %signal.symbol, error = %e, "Could not fetch account for sizing");
                self.notifier.notify(
                    &format!("Could not size {} {}: {e}", signal.action, signal.symbol),
                    Priority::High,
                );
                return None;
            }
        };
        let qty = self.strategy.position_size(&signal.symbol, price, equity, &self.cache);
        if qty == 0 {
            warn!(symbol = %signal.symbol, price, equity, "Position size calculated as 0");
            return None;
        }

        info!(
            symbol     = %signal.symbol,
            action     = %signal.action,
            confidence = signal.confidence,
            qty,
            "🎯 SIGNAL: {}",
            signal.reason
        );
        self.status.signals_acted += 1;
        self.emit(BotEvent::SignalActed { signal: signal.clone() });

        let outcome = match signal.action {
            Action::Buy => {
                self.executor
                    .submit_bracket_order(&signal.symbol, qty, OrderSide::Buy, price)
                    .await
            }
            _ => {
                self.executor
                    .submit_order(&signal.symbol, position.unsigned_abs(), OrderSide::Sell, OrderType::Limit)
                    .await
            }
        };

        match &outcome {
            SubmitOutcome::Submitted(record) => {
                self.status.orders_submitted += 1;
                self.emit(BotEvent::OrderSubmitted { record: Box::new(record.clone()) });
            }
            SubmitOutcome::Rejected(reason) => self.emit(BotEvent::OrderRejected {
                symbol: signal.symbol.clone(),
                reason: reason.to_string(),
            }),
            SubmitOutcome::Failed(e) => self.emit(BotEvent::OrderFailed {
                symbol: signal.symbol.clone(),
                error:  e.to_string(),
            }),
        }
        Some(outcome)
    }

    fn refresh_cache_stats(&mut self, symbol: &str) {
        let stats = self.cache.statistics(symbol);
        self.status.cache.insert(symbol.to_string(), stats);
    }

    // ── Periodic Tasks ────────────────────────────────────────────────────────

    /// `true` when the circuit breaker tripped.
    pub async fn check_pnl(&mut self) -> bool {
        let snapshot = match self.executor.update_daily_pnl().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Error checking P&L");
                self.notifier.notify(&format!("Error checking P&L: {e}"), Priority::High);
                return false;
            }
        };

        let floor = self.executor.loss_floor(snapshot.equity);
        let pct = if snapshot.start_of_day_equity > 0.0 {
            snapshot.daily_pnl / snapshot.start_of_day_equity * 100.0
        } else {
            0.0
        };
        info!(daily_pnl = snapshot.daily_pnl, pct, "📊 Daily P&L: ${:.2} ({:.2}%)", snapshot.daily_pnl, pct);

        if snapshot.daily_pnl < floor {
            error!(daily_pnl = snapshot.daily_pnl, floor, "🛑 CIRCUIT BREAKER TRIGGERED");
            self.notifier.notify(
                &format!(
                    "CIRCUIT BREAKER TRIGGERED\nDaily P&L: ${:.2}\nLimit: ${:.2}\nClosing all positions...",
                    snapshot.daily_pnl, floor,
                ),
                Priority::Critical,
            );
            self.emit(BotEvent::CircuitBreaker { daily_pnl: snapshot.daily_pnl, floor });
            return true;
        }
        false
    }

    async fn check_market_close(&mut self) -> Option<Exit> {
        match self.broker.clock().await {
            Ok(clock) if !clock.is_open => {
                info!("🔔 Market closed");
                Some(Exit::Graceful("market closed".to_string()))
            }
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "Error checking market status");
                self.notifier.notify(&format!("Error checking market status: {e}"), Priority::High);
                None
            }
        }
    }

    async fn sync_positions(&mut self) {
        // failures are logged and alerted by the executor
        if self.executor.sync_positions().await.is_ok() && !self.executor.positions().is_empty() {
            info!(positions = ?self.executor.positions(), "📋 Positions synced");
        }
    }

    pub fn health_check(&self) {
        let since = self.status.last_tick_at.map(|at| (Utc::now() - at).num_seconds());
        let stale = since.map_or(true, |secs| secs > self.schedule.stale_feed.as_secs() as i64);

        match since {
            Some(secs) if stale => warn!(secs, "⚠️  No data received for {secs}s - connection may be stale"),
            None => warn!("⚠️  No market data received yet"),
            _ => {}
        }

        info!(
            trades    = self.status.trades_processed,
            signals   = self.status.signals_evaluated,
            orders    = self.status.orders_submitted,
            positions = self.executor.positions().len(),
            "💓 Health check"
        );
        self.emit(BotEvent::HealthReport {
            trades_processed:  self.status.trades_processed,
            signals_evaluated: self.status.signals_evaluated,
            orders_submitted:  self.status.orders_submitted,
            open_positions:    self.executor.positions().len(),
            secs_since_tick:   since,
            stale,
        });
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    async fn graceful_shutdown(&mut self, reason: String) -> SessionSummary {
        self.transition(BotState::GracefulShutdown);
        info!(%reason, "👋 Graceful shutdown");

        if let Err(e) = self.executor.cancel_all_orders(None).await {
            error!(error = %e, "Could not cancel open orders");
        }
        self.finish(reason).await
    }

    async fn emergency_shutdown(&mut self, reason: String) -> SessionSummary {
        self.transition(BotState::EmergencyShutdown);
        error!(%reason, "🚨 EMERGENCY SHUTDOWN INITIATED");

        let report = self.executor.emergency_liquidate().await;
        if !report.failures.is_empty() {
            self.notifier.notify(
                &format!("Emergency shutdown error: {}", report.failures.join(", ")),
                Priority::Critical,
            );
        }
        self.finish(reason).await
    }

    async fn finish(&mut self, reason: String) -> SessionSummary {
        let summary = self.summary(reason).await;
        let text = summary.render();
        info!("\n{text}");
        self.notifier.notify(&text, Priority::Medium);
        self.emit(BotEvent::SessionSummary { summary: summary.clone() });
        summary
    }

    async fn summary(&mut self, reason: String) -> SessionSummary {
        let snapshot = match self.executor.update_daily_pnl().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Final account refresh failed, using last known");
                self.executor.last_account()
            }
        };
        let final_equity = snapshot.map(|s| s.equity).unwrap_or(0.0);
        let start_equity = self.executor.start_of_day_equity().unwrap_or(final_equity);

        SessionSummary {
            final_state: self.status.state,
            reason,
            start_equity,
            final_equity,
            daily_pnl: self.executor.daily_pnl(),
            ticks_processed: self.status.trades_processed + self.status.quotes_processed,
            signals_evaluated: self.status.signals_evaluated,
            orders_submitted: self.status.orders_submitted,
            open_positions: self.executor.positions().len(),
        }
    }

    // ── Status / Events ───────────────────────────────────────────────────────

    fn transition(&mut self, to: BotState) {
        let from = self.status.state;
        if from == to {
            return;
        }
        info!(%from, %to, "🔀 State {from} → {to}");
        self.status.state = to;
        self.emit(BotEvent::StateChanged { from, to });
        self.publish_status();
    }

    fn publish_status(&mut self) {
        self.status.positions = self.executor.positions().clone();
        self.status.account = self.executor.last_account();
        self.status.regime = self.strategy.regime();
        self.status.updated_at = Utc::now();
        self.status_tx.send_replace(self.status.clone());
    }

    fn emit(&self, event: BotEvent) {
        // no subscribers is fine
        let _ = self.broadcast_tx.send(event.to_json());
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
