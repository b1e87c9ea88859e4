//! # engine::momentum
//!
//! Momentum breakout: buy strength through the prior high, sell weakness
//! through the prior low, but only when volume confirms the move.
//!
//! The reference window is the `period` trades *before* the latest print, so
//! the current trade is compared against previous highs and lows rather than
//! against itself.

use std::time::Duration;

use crate::cache::TickCache;
use crate::engine::strategy::{whole_shares, SignalCooldown, SizingLimits, Strategy};
use crate::models::Signal;

/// Trades used for the ATR approximation in position sizing.
const ATR_WINDOW: usize = 14;
/// ATR/price ที่ถือว่าเป็นความผันผวน "ปกติ"
const BASELINE_VOLATILITY: f64 = 0.02;

#[derive(Debug, Clone)]
pub struct MomentumBreakoutStrategy {
    pub period:            usize,
    pub threshold:         f64,
    pub volume_multiplier: f64,
    sizing:                SizingLimits,
    cooldown:              SignalCooldown,
    signals_generated:     u64,
}

impl MomentumBreakoutStrategy {
    pub fn new(sizing: SizingLimits, cooldown: Duration) -> Self {
        Self {
            period:            20,
            threshold:         0.02,
            volume_multiplier: 2.0,
            sizing,
            cooldown:          SignalCooldown::new(cooldown),
            signals_generated: 0,
        }
    }

    pub fn signals_generated(&self) -> u64 {
        self.signals_generated
    }
}

impl Strategy for MomentumBreakoutStrategy {
    fn name(&self) -> &'static str {
        "MomentumBreakout"
    }

    fn evaluate(&mut self, symbol: &str, cache: &TickCache) -> Signal {
        if self.cooldown.is_active(symbol) {
            return Signal::hold(symbol, "Signal cooldown active");
        }

        let Some(current) = cache.last_trade(symbol) else {
            return Signal::hold(symbol, "No price data available");
        };
        let (price, volume) = (current.price, current.size);

        if cache.trade_count(symbol) <= self.period {
            return Signal::hold(
                symbol,
                format!("Insufficient data (need {} trades)", self.period + 1),
            );
        }

        // ── Reference window: N trades ก่อน trade ล่าสุด ──────────────────────
        let window = cache.recent_trades(symbol, self.period + 1);
        let reference = &window[..window.len() - 1];

        let high = reference.iter().map(|t| t.price).fold(f64::MIN, f64::max);
        let low = reference.iter().map(|t| t.price).fold(f64::MAX, f64::min);
        let avg_volume = reference.iter().map(|t| t.size).sum::<f64>() / reference.len() as f64;
        let volume_ratio = volume / avg_volume;
        let confirmed = volume >= avg_volume * self.volume_multiplier;

        // ── Breakout ────────────────────────────────────────────────────────
        if price >= high * (1.0 + self.threshold) {
            if !confirmed {
                return Signal::hold(
                    symbol,
                    format!(
                        "Breakout without volume confirmation ({volume_ratio:.1}x < {}x)",
                        self.volume_multiplier
                    ),
                );
            }
            let pct = (price - high) / high * 100.0;
            self.cooldown.mark(symbol);
            self.signals_generated += 1;
            return Signal::buy(
                symbol,
                (pct / 5.0).min(1.0),
                format!("Breakout: {pct:.1}% above ${high:.2} high, volume {volume_ratio:.1}x avg"),
            );
        }

        // ── Breakdown ───────────────────────────────────────────────────────
        if price <= low * (1.0 - self.threshold) {
            if !confirmed {
                return Signal::hold(
                    symbol,
                    format!(
                        "Breakdown without volume confirmation ({volume_ratio:.1}x < {}x)",
                        self.volume_multiplier
                    ),
                );
            }
            let pct = (low - price) / low * 100.0;
            self.cooldown.mark(symbol);
            self.signals_generated += 1;
            return Signal::sell(
                symbol,
                (pct / 5.0).min(1.0),
                format!("Breakdown: {pct:.1}% below ${low:.2} low, volume {volume_ratio:.1}x avg"),
            );
        }

        Signal::hold(
            symbol,
            format!("No breakout: price ${price:.2} within ${low:.2}-${high:.2} range"),
        )
    }

    /// Volatility-normalised: ATR above the 2% baseline shrinks the position.
    fn position_size(&self, symbol: &str, price: f64, equity: f64, cache: &TickCache) -> u64 {
        if cache.trade_count(symbol) < ATR_WINDOW {
            return self.sizing.max_shares(price, equity);
        }

        let prices: Vec<f64> = cache
            .recent_trades(symbol, ATR_WINDOW)
            .iter()
            .map(|t| t.price)
            .collect();
        let atr = prices.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>()
            / (prices.len() - 1) as f64;

        let max_pct = self.sizing.max_position_pct;
        let volatility = atr / price;
        let risk_adjusted = max_pct / (volatility / BASELINE_VOLATILITY).max(1.0);

        whole_shares(equity * risk_adjusted.min(max_pct), price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use chrono::Utc;

    fn breakout_cache(final_price: f64, final_volume: f64) -> TickCache {
        let mut cache = TickCache::new(100);
        let now = Utc::now();
        for i in 0..20 {
            let price = if i % 2 == 0 { 99.0 } else { 100.0 };
            cache.add_trade("NVDA", price, 100.0, now).unwrap();
        }
        cache.add_trade("NVDA", final_price, final_volume, now).unwrap();
        cache
    }

    fn strategy() -> MomentumBreakoutStrategy {
        MomentumBreakoutStrategy::new(SizingLimits::default(), Duration::from_secs(300))
    }

    #[test]
    fn breakout_with_volume_buys() {
        let signal = strategy().evaluate("NVDA", &breakout_cache(103.0, 250.0));
        assert_eq!(signal.action, Action::Buy);
        assert!((signal.confidence - 0.6).abs() < 1e-9);
        assert!(signal.reason.starts_with("Breakout: 3.0% above $100.00 high"));
    }

    #[test]
    fn breakout_without_volume_holds() {
        let signal = strategy().evaluate("NVDA", &breakout_cache(103.0, 80.0));
        assert_eq!(signal.action, Action::Hold);
        assert!(signal.reason.contains("without volume confirmation"));
    }

    #[test]
    fn breakdown_with_volume_sells() {
        let signal = strategy().evaluate("NVDA", &breakout_cache(95.0, 300.0));
        assert_eq!(signal.action, Action::Sell);
        assert!(signal.reason.starts_with("Breakdown"));
    }

    #[test]
    fn inside_range_holds() {
        let signal = strategy().evaluate("NVDA", &breakout_cache(100.5, 500.0));
        assert_eq!(signal.action, Action::Hold);
        assert!(signal.reason.starts_with("No breakout"));
    }

    #[test]
    fn needs_a_full_reference_window() {
        let mut cache = TickCache::new(100);
        for _ in 0..20 {
            cache.add_trade("NVDA", 100.0, 100.0, Utc::now()).unwrap();
        }
        let signal = strategy().evaluate("NVDA", &cache);
        assert_eq!(signal.reason, "Insufficient data (need 21 trades)");
    }

    #[test]
    fn sizing_shrinks_with_volatility() {
        let strategy = strategy();
        let thin = TickCache::new(100);
        assert_eq!(strategy.position_size("NVDA", 100.0, 100_000.0, &thin), 100);

        // quiet tape (ATR ≈ 1% of price) → full allocation
        let quiet = breakout_cache(100.0, 100.0);
        assert_eq!(strategy.position_size("NVDA", 100.0, 100_000.0, &quiet), 100);

        // ATR = 4 on a $100 stock → 2× baseline → half allocation
        let mut wild = TickCache::new(100);
        for i in 0..14 {
            let price = if i % 2 == 0 { 98.0 } else { 102.0 };
            wild.add_trade("NVDA", price, 100.0, Utc::now()).unwrap();
        }
        assert_eq!(strategy.position_size("NVDA", 100.0, 100_000.0, &wild), 50);
    }
}
