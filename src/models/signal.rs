//! # models::signal
//!
//! Defines [`Signal`] — the verdict a strategy produces for one symbol on one
//! evaluation. Signals are transient: created per evaluation, acted on or
//! ignored by the orchestrator, then dropped.

use serde::{Deserialize, Serialize};

// ─── Action ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    /// No edge, or the strategy refused to decide (missing data, cooldown, ...).
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy  => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

// ─── Signal ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action:     Action,
    pub symbol:     String,
    /// Signal strength in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable diagnostic (why BUY / why HOLD).
    pub reason:     String,
    /// 0 unless the strategy pre-sized the order.
    pub quantity:   u64,
}

impl Signal {
    /// A HOLD carrying the reason the strategy stood aside.
    pub fn hold(symbol: &str, reason: impl Into<String>) -> Self {
        Self {
            action:     Action::Hold,
            symbol:     symbol.to_string(),
            confidence: 0.0,
            reason:     reason.into(),
            quantity:   0,
        }
    }

    pub fn buy(symbol: &str, confidence: f64, reason: impl Into<String>) -> Self {
        Self::actionable(Action::Buy, symbol, confidence, reason)
    }

    pub fn sell(symbol: &str, confidence: f64, reason: impl Into<String>) -> Self {
        Self::actionable(Action::Sell, symbol, confidence, reason)
    }

    fn actionable(action: Action, symbol: &str, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action,
            symbol:     symbol.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            reason:     reason.into(),
            quantity:   0,
        }
    }

    /// BUY or SELL.
    #[inline]
    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold
    }
}
