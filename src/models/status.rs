//! # models::status
//!
//! Lifecycle and status snapshot of the orchestrator, published over a
//! `watch` channel and served to the dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cache::CacheStatistics;
use crate::engine::regime::Regime;
use crate::models::position::{AccountSnapshot, Positions};

// ─── BotState ─────────────────────────────────────────────────────────────────

/// ```text
/// STARTUP → WAITING_FOR_OPEN → RUNNING → GRACEFUL_SHUTDOWN  ─┐
///                                      → EMERGENCY_SHUTDOWN ─┴→ STOPPED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotState {
    Startup,
    WaitingForOpen,
    Running,
    GracefulShutdown,
    EmergencyShutdown,
    Stopped,
}

impl BotState {
    /// Shutdown paths and STOPPED never lead back to RUNNING.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BotState::GracefulShutdown | BotState::EmergencyShutdown | BotState::Stopped
        )
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BotState::Startup           => "STARTUP",
            BotState::WaitingForOpen    => "WAITING_FOR_OPEN",
            BotState::Running           => "RUNNING",
            BotState::GracefulShutdown  => "GRACEFUL_SHUTDOWN",
            BotState::EmergencyShutdown => "EMERGENCY_SHUTDOWN",
            BotState::Stopped           => "STOPPED",
        };
        f.write_str(s)
    }
}

// ─── BotStatus ────────────────────────────────────────────────────────────────

/// Point-in-time view of the session.
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    /// Fresh per process run; ties dashboard snapshots to one session.
    pub session_id:        Uuid,
    pub state:             BotState,
    pub strategy:          String,
    pub regime:            Option<Regime>,
    pub account:           Option<AccountSnapshot>,
    pub positions:         Positions,
    /// Latest TickCache statistics per symbol that has seen a tick.
    pub cache:             BTreeMap<String, CacheStatistics>,
    pub trades_processed:  u64,
    pub quotes_processed:  u64,
    /// Quotes whose bid/ask spread exceeded the liquidity warning level.
    pub wide_spreads:      u64,
    pub signals_evaluated: u64,
    pub signals_acted:     u64,
    pub orders_submitted:  u64,
    pub last_tick_at:      Option<DateTime<Utc>>,
    pub started_at:        DateTime<Utc>,
    pub updated_at:        DateTime<Utc>,
}

impl BotStatus {
    pub fn new(strategy: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id:        Uuid::new_v4(),
            state:             BotState::Startup,
            strategy:          strategy.to_string(),
            regime:            None,
            account:           None,
            positions:         Positions::new(),
            cache:             BTreeMap::new(),
            trades_processed:  0,
            quotes_processed:  0,
            wide_spreads:      0,
            signals_evaluated: 0,
            signals_acted:     0,
            orders_submitted:  0,
            last_tick_at:      None,
            started_at:        now,
            updated_at:        now,
        }
    }
}

// ─── SessionSummary ───────────────────────────────────────────────────────────

/// Emitted once when the session ends.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub final_state:       BotState,
    /// Why the session ended ("market closed", "circuit breaker", ...).
    pub reason:            String,
    pub start_equity:      f64,
    pub final_equity:      f64,
    pub daily_pnl:         f64,
    pub ticks_processed:   u64,
    pub signals_evaluated: u64,
    pub orders_submitted:  u64,
    pub open_positions:    usize,
}

impl SessionSummary {
    pub fn daily_pnl_pct(&self) -> f64 {
        if self.start_equity > 0.0 {
            self.daily_pnl / self.start_equity * 100.0
        } else {
            0.0
        }
    }

    /// Multi-line text used for the shutdown alert.
    pub fn render(&self) -> String {
        format!(
            "DAILY SUMMARY ({reason})\n\
             P&L: ${pnl:.2} ({pct:.2}%)\n\
             Ticks processed: {ticks}\n\
             Signals evaluated: {signals}\n\
             Orders submitted: {orders}\n\
             Open positions: {open}\n\
             Final equity: ${equity:.2}",
            reason  = self.reason,
            pnl     = self.daily_pnl,
            pct     = self.daily_pnl_pct(),
            ticks   = self.ticks_processed,
            signals = self.signals_evaluated,
            orders  = self.orders_submitted,
            open    = self.open_positions,
            equity  = self.final_equity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_renders_pnl_percentage() {
        let summary = SessionSummary {
            final_state:       BotState::Stopped,
            reason:            "market closed".into(),
            start_equity:      100_000.0,
            final_equity:      101_250.0,
            daily_pnl:         1_250.0,
            ticks_processed:   42,
            signals_evaluated: 40,
            orders_submitted:  2,
            open_positions:    1,
        };
        let text = summary.render();
        assert!(text.starts_with("DAILY SUMMARY (market closed)\nP&L: $1250.00 (1.25%)"));
        assert!(text.ends_with("Final equity: $101250.00"));
    }

    #[test]
    fn terminal_states() {
        assert!(!BotState::Running.is_terminal());
        assert!(BotState::EmergencyShutdown.is_terminal());
    }
}
