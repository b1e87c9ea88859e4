//! # engine::mean_reversion
//!
//! ราคาแกว่งรอบค่าเฉลี่ย — เมื่อหลุดเกิน `threshold` σ คาดว่าจะกลับเข้าหาค่าเฉลี่ย
//!
//! ```text
//! z = (price − mean(last N)) / σ(last N)
//! z < −2.0  →  BUY   (Oversold)
//! z > +2.0  →  SELL  (Overbought)
//! confidence = min(|z| / 3, 1)
//! ```

use std::time::Duration;

use crate::cache::TickCache;
use crate::engine::strategy::{whole_shares, SignalCooldown, SizingLimits, Strategy};
use crate::models::Signal;

/// สัดส่วนของ equity ที่ยอมเสี่ยงต่อ 1 เทรด
const RISK_PER_TRADE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    pub lookback:        usize,
    pub threshold:       f64,
    pub max_spread_bps:  f64,
    sizing:              SizingLimits,
    cooldown:            SignalCooldown,
    signals_generated:   u64,
}

impl MeanReversionStrategy {
    pub fn new(sizing: SizingLimits, cooldown: Duration) -> Self {
        Self {
            lookback:          20,
            threshold:         2.0,
            max_spread_bps:    20.0,
            sizing,
            cooldown:          SignalCooldown::new(cooldown),
            signals_generated: 0,
        }
    }

    pub fn signals_generated(&self) -> u64 {
        self.signals_generated
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "MeanReversion"
    }

    fn evaluate(&mut self, symbol: &str, cache: &TickCache) -> Signal {
        if self.cooldown.is_active(symbol) {
            return Signal::hold(symbol, "Signal cooldown active");
        }

        let Some(price) = cache.last_price(symbol) else {
            return Signal::hold(symbol, "No price data available");
        };

        if cache.trade_count(symbol) < self.lookback {
            return Signal::hold(
                symbol,
                format!("Insufficient data (need {} trades)", self.lookback),
            );
        }

        match cache.spread_bps(symbol) {
            Some(bps) if bps <= self.max_spread_bps => {}
            Some(bps) => {
                return Signal::hold(
                    symbol,
                    format!("Spread too wide ({bps:.1} bps > {} bps)", self.max_spread_bps),
                );
            }
            None => return Signal::hold(symbol, "Spread unavailable (no quote)"),
        }

        let prices: Vec<f64> = cache
            .recent_trades(symbol, self.lookback)
            .iter()
            .map(|t| t.price)
            .collect();
        let (mean, std) = mean_std(&prices);

        if std == 0.0 {
            return Signal::hold(symbol, "Zero volatility (stale data)");
        }

        let z = (price - mean) / std;
        let confidence = (z.abs() / 3.0).min(1.0);

        if z < -self.threshold {
            self.cooldown.mark(symbol);
            self.signals_generated += 1;
            Signal::buy(
                symbol,
                confidence,
                format!("Oversold: {z:.2} std devs below mean (${mean:.2})"),
            )
        } else if z > self.threshold {
            self.cooldown.mark(symbol);
            self.signals_generated += 1;
            Signal::sell(
                symbol,
                confidence,
                format!("Overbought: {z:.2} std devs above mean (${mean:.2})"),
            )
        } else {
            Signal::hold(symbol, format!("Within range: {z:.2} std devs from mean"))
        }
    }

    /// เสี่ยง 1% ของ equity ต่อระยะ stop-loss แล้วตัดด้วยเพดาน position
    fn position_size(&self, _symbol: &str, price: f64, equity: f64, _cache: &TickCache) -> u64 {
        let stop_distance = price * self.sizing.stop_loss_pct;
        let shares = whole_shares(equity * RISK_PER_TRADE, stop_distance);
        shares.min(self.sizing.max_shares(price, equity))
    }
}

/// Mean and population standard deviation.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use chrono::Utc;

    fn flat_then(final_price: f64, bid: f64, ask: f64) -> TickCache {
        let mut cache = TickCache::new(100);
        let now = Utc::now();
        for _ in 0..20 {
            cache.add_trade("AAPL", 100.0, 100.0, now).unwrap();
        }
        cache.add_trade("AAPL", final_price, 100.0, now).unwrap();
        cache.add_quote("AAPL", bid, ask, 100.0, 100.0, now).unwrap();
        cache
    }

    fn strategy() -> MeanReversionStrategy {
        MeanReversionStrategy::new(SizingLimits::default(), Duration::from_secs(300))
    }

    #[test]
    fn oversold_yields_buy() {
        let cache = flat_then(90.0, 89.95, 90.05);
        let signal = strategy().evaluate("AAPL", &cache);
        assert_eq!(signal.action, Action::Buy);
        assert!(signal.confidence > 0.5);
        assert!(signal.reason.contains("Oversold"), "{}", signal.reason);
    }

    #[test]
    fn overbought_yields_sell() {
        let cache = flat_then(110.0, 109.95, 110.05);
        let signal = strategy().evaluate("AAPL", &cache);
        assert_eq!(signal.action, Action::Sell);
        assert!(signal.reason.contains("Overbought"));
    }

    #[test]
    fn cooldown_blocks_repeat_signal() {
        let cache = flat_then(90.0, 89.95, 90.05);
        let mut strategy = strategy();
        assert_eq!(strategy.evaluate("AAPL", &cache).action, Action::Buy);

        let second = strategy.evaluate("AAPL", &cache);
        assert_eq!(second.action, Action::Hold);
        assert!(second.reason.contains("cooldown"));
        assert_eq!(strategy.signals_generated(), 1);
    }

    #[test]
    fn holds_on_missing_or_degenerate_data() {
        let mut strategy = strategy();
        let empty = TickCache::new(100);
        assert_eq!(strategy.evaluate("AAPL", &empty).reason, "No price data available");

        let mut thin = TickCache::new(100);
        thin.add_trade("AAPL", 100.0, 1.0, Utc::now()).unwrap();
        assert!(strategy.evaluate("AAPL", &thin).reason.starts_with("Insufficient data"));

        let wide = flat_then(90.0, 89.0, 91.0);
        assert!(strategy.evaluate("AAPL", &wide).reason.starts_with("Spread too wide"));

        let flat = flat_then(100.0, 99.99, 100.01);
        assert_eq!(strategy.evaluate("AAPL", &flat).reason, "Zero volatility (stale data)");
    }

    #[test]
    fn sizing_risks_one_percent_capped_by_position_limit() {
        let cache = TickCache::new(10);
        let strategy = strategy();
        // 1_000 / (100 × 0.02) = 500 shares, cap = 10_000 / 100 = 100
        assert_eq!(strategy.position_size("AAPL", 100.0, 100_000.0, &cache), 100);
        // wider stop → fewer shares, cap no longer binds
        let tight = MeanReversionStrategy::new(
            SizingLimits { stop_loss_pct: 0.25, max_position_pct: 0.5 },
            Duration::from_secs(1),
        );
        assert_eq!(tight.position_size("AAPL", 100.0, 100_000.0, &cache), 40);
    }

    #[test]
    fn mean_std_is_population() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
    }
}
