//! # engine::strategy
//!
//! Common contract for every signal generator.
//!
//! ```text
//!            ┌──────────────────────┐
//!  TickCache │  Strategy::evaluate  │──▶ Signal { BUY | SELL | HOLD, confidence, reason }
//!  ─────────▶│  Strategy::position_size ──▶ shares
//!            └──────────────────────┘
//!   impls: MeanReversion · MomentumBreakout · Hybrid (regime-switched)
//! ```
//!
//! Strategies never fail on missing data — they return HOLD with a reason.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::TickCache;
use crate::config::{RiskConfig, StrategyConfig, StrategyKind};
use crate::engine::hybrid::HybridStrategy;
use crate::engine::mean_reversion::MeanReversionStrategy;
use crate::engine::momentum::MomentumBreakoutStrategy;
use crate::engine::regime::Regime;
use crate::models::Signal;

// ─── Strategy Trait ───────────────────────────────────────────────────────────

pub trait Strategy: Send + Sync {
    /// Stable identifier used in logs and alerts.
    fn name(&self) -> &'static str;

    /// Analyse the cache for `symbol` and produce a signal.
    fn evaluate(&mut self, symbol: &str, cache: &TickCache) -> Signal;

    /// Shares to trade at `price` for an account worth `equity`.
    fn position_size(&self, symbol: &str, price: f64, equity: f64, cache: &TickCache) -> u64;

    /// Last regime the strategy acted under, if it tracks one.
    fn regime(&self) -> Option<Regime> {
        None
    }
}

pub type BoxedStrategy = Box<dyn Strategy>;

/// Build the configured strategy.
pub fn build_strategy(config: &StrategyConfig, risk: &RiskConfig) -> BoxedStrategy {
    let sizing = SizingLimits::from(risk);
    match config.kind {
        StrategyKind::MeanReversion => {
            Box::new(MeanReversionStrategy::new(sizing, config.cooldown))
        }
        StrategyKind::Momentum => {
            Box::new(MomentumBreakoutStrategy::new(sizing, config.cooldown))
        }
        StrategyKind::Hybrid => Box::new(HybridStrategy::new(
            MeanReversionStrategy::new(sizing, config.cooldown),
            MomentumBreakoutStrategy::new(sizing, config.cooldown),
            &config.regime_reference,
            config.regime_recheck,
            config.cooldown,
        )),
    }
}

// ─── Sizing Limits ────────────────────────────────────────────────────────────

/// Risk knobs every sizing formula needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingLimits {
    pub stop_loss_pct:    f64,
    pub max_position_pct: f64,
}

impl From<&RiskConfig> for SizingLimits {
    fn from(risk: &RiskConfig) -> Self {
        Self {
            stop_loss_pct:    risk.stop_loss_pct,
            max_position_pct: risk.max_position_pct,
        }
    }
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

impl SizingLimits {
    /// Whole shares affordable under the per-position cap.
    pub fn max_shares(&self, price: f64, equity: f64) -> u64 {
        whole_shares(equity * self.max_position_pct, price)
    }
}

/// `floor(value / price)`, 0 for non-positive inputs.
pub(crate) fn whole_shares(value: f64, price: f64) -> u64 {
    if !(price > 0.0) || !(value > 0.0) {
        return 0;
    }
    (value / price).floor() as u64
}

// ─── Cooldown ─────────────────────────────────────────────────────────────────

/// กันยิง Signal ถี่เกินไป — symbol เดียวกันต้องห่างกันอย่างน้อย `window`
/// HOLD ไม่นับ (ไม่ต้อง mark)
#[derive(Debug, Clone)]
pub struct SignalCooldown {
    window:      Duration,
    last_signal: HashMap<String, DateTime<Utc>>,
}

impl SignalCooldown {
    pub fn new(window: Duration) -> Self {
        Self { window, last_signal: HashMap::new() }
    }

    pub fn is_active(&self, symbol: &str) -> bool {
        self.is_active_at(symbol, Utc::now())
    }

    pub fn is_active_at(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        match self.last_signal.get(symbol) {
            Some(last) => {
                let elapsed = now.signed_duration_since(*last);
                elapsed.to_std().map_or(true, |e| e < self.window)
            }
            None => false,
        }
    }

    /// บันทึกเวลาที่ยิง Signal (BUY/SELL เท่านั้น)
    pub fn mark(&mut self, symbol: &str) {
        self.mark_at(symbol, Utc::now());
    }

    pub fn mark_at(&mut self, symbol: &str, at: DateTime<Utc>) {
        self.last_signal.insert(symbol.to_string(), at);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_expires_after_window() {
        let mut cooldown = SignalCooldown::new(Duration::from_secs(300));
        let t0 = Utc::now();
        assert!(!cooldown.is_active_at("AAPL", t0));

        cooldown.mark_at("AAPL", t0);
        assert!(cooldown.is_active_at("AAPL", t0 + chrono::Duration::seconds(299)));
        assert!(!cooldown.is_active_at("AAPL", t0 + chrono::Duration::seconds(300)));
        assert!(!cooldown.is_active_at("MSFT", t0));
    }

    #[test]
    fn whole_shares_floors_and_guards() {
        assert_eq!(whole_shares(10_000.0, 100.0), 100);
        assert_eq!(whole_shares(9_999.0, 100.0), 99);
        assert_eq!(whole_shares(10_000.0, 0.0), 0);
        assert_eq!(whole_shares(-5.0, 10.0), 0);
    }

    #[test]
    fn builds_configured_strategy() {
        let risk = RiskConfig::default();
        let mut config = StrategyConfig::default();
        assert_eq!(build_strategy(&config, &risk).name(), "Hybrid");
        config.kind = StrategyKind::MeanReversion;
        assert_eq!(build_strategy(&config, &risk).name(), "MeanReversion");
        config.kind = StrategyKind::Momentum;
        assert_eq!(build_strategy(&config, &risk).name(), "MomentumBreakout");
    }
}
