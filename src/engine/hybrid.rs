//! # engine::hybrid
//!
//! Regime-switched strategy:
//!
//! | Regime   | Delegate             | Sizing       |
//! |----------|----------------------|--------------|
//! | TRENDING | MomentumBreakout     | as delegate  |
//! | RANGING  | MeanReversion        | as delegate  |
//! | VOLATILE | — (forced HOLD)      | delegate × ½ |
//!
//! The cooldown is held here, not per delegate: a regime flip must not open
//! a second signal window for a symbol the other delegate just traded.

use std::time::Duration;

use crate::cache::TickCache;
use crate::engine::mean_reversion::MeanReversionStrategy;
use crate::engine::momentum::MomentumBreakoutStrategy;
use crate::engine::regime::{Regime, RegimeDetector};
use crate::engine::strategy::{SignalCooldown, Strategy};
use crate::models::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    MeanReversion,
    Momentum,
}

#[derive(Debug, Clone)]
pub struct HybridStrategy {
    mean_reversion: MeanReversionStrategy,
    momentum:       MomentumBreakoutStrategy,
    detector:       RegimeDetector,
    cooldown:       SignalCooldown,
    active:         Active,
}

impl HybridStrategy {
    pub fn new(
        mean_reversion: MeanReversionStrategy,
        momentum: MomentumBreakoutStrategy,
        reference: &str,
        recheck: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            mean_reversion,
            momentum,
            detector: RegimeDetector::new(reference, recheck),
            cooldown: SignalCooldown::new(cooldown),
            active:   Active::MeanReversion,
        }
    }

    fn active_strategy(&self) -> &dyn Strategy {
        match self.active {
            Active::MeanReversion => &self.mean_reversion,
            Active::Momentum      => &self.momentum,
        }
    }
}

impl Strategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "Hybrid"
    }

    fn evaluate(&mut self, symbol: &str, cache: &TickCache) -> Signal {
        let regime = self.detector.detect(cache);

        let mut signal = match regime {
            Regime::Volatile => {
                return Signal::hold(symbol, "VOLATILE regime detected - staying in cash");
            }
            _ if self.cooldown.is_active(symbol) => {
                return Signal::hold(symbol, format!("[{regime}] Signal cooldown active"));
            }
            Regime::Trending => {
                self.active = Active::Momentum;
                self.momentum.evaluate(symbol, cache)
            }
            Regime::Ranging => {
                self.active = Active::MeanReversion;
                self.mean_reversion.evaluate(symbol, cache)
            }
        };

        if signal.is_actionable() {
            self.cooldown.mark(symbol);
        }
        signal.reason = format!("[{regime}] {}", signal.reason);
        signal
    }

    fn position_size(&self, symbol: &str, price: f64, equity: f64, cache: &TickCache) -> u64 {
        let shares = self.active_strategy().position_size(symbol, price, equity, cache);
        if self.detector.current() == Regime::Volatile {
            shares / 2
        } else {
            shares
        }
    }

    fn regime(&self) -> Option<Regime> {
        Some(self.detector.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::strategy::SizingLimits;
    use crate::models::Action;
    use chrono::Utc;

    fn hybrid_with_recheck(recheck: Duration) -> HybridStrategy {
        let cooldown = Duration::from_secs(300);
        HybridStrategy::new(
            MeanReversionStrategy::new(SizingLimits::default(), cooldown),
            MomentumBreakoutStrategy::new(SizingLimits::default(), cooldown),
            "SPY",
            recheck,
            cooldown,
        )
    }

    fn hybrid() -> HybridStrategy {
        hybrid_with_recheck(Duration::from_secs(3600))
    }

    fn feed_spy(cache: &mut TickCache, prices: impl IntoIterator<Item = f64>) {
        for p in prices {
            cache.add_trade("SPY", p, 100.0, Utc::now()).unwrap();
        }
    }

    fn oversold_aapl(cache: &mut TickCache) {
        let now = Utc::now();
        for _ in 0..20 {
            cache.add_trade("AAPL", 100.0, 100.0, now).unwrap();
        }
        cache.add_trade("AAPL", 90.0, 100.0, now).unwrap();
        cache.add_quote("AAPL", 89.95, 90.05, 100.0, 100.0, now).unwrap();
    }

    #[test]
    fn ranging_delegates_to_mean_reversion() {
        let mut cache = TickCache::new(100);
        feed_spy(&mut cache, [500.0; 20]);
        oversold_aapl(&mut cache);

        let signal = hybrid().evaluate("AAPL", &cache);
        assert_eq!(signal.action, Action::Buy);
        assert!(signal.reason.starts_with("[RANGING] Oversold"), "{}", signal.reason);
    }

    #[test]
    fn trending_delegates_to_momentum() {
        let mut cache = TickCache::new(100);
        feed_spy(&mut cache, (0..20).map(|i| 500.0 + 0.2 * i as f64));
        oversold_aapl(&mut cache);

        let mut strategy = hybrid();
        let signal = strategy.evaluate("AAPL", &cache);
        assert_eq!(strategy.regime(), Some(Regime::Trending));
        // a 10% drop with flat volume is an unconfirmed breakdown
        assert_eq!(signal.action, Action::Hold);
        assert!(signal.reason.starts_with("[TRENDING] Breakdown without volume"), "{}", signal.reason);
    }

    #[test]
    fn volatile_forces_hold_and_halves_size() {
        let mut cache = TickCache::new(100);
        feed_spy(&mut cache, (0..20).map(|i| if i % 2 == 0 { 500.0 } else { 510.0 }));
        oversold_aapl(&mut cache);

        let mut strategy = hybrid();
        let signal = strategy.evaluate("AAPL", &cache);
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reason, "VOLATILE regime detected - staying in cash");
        // mean reversion would size 100 shares at $100 on $100k
        assert_eq!(strategy.position_size("AAPL", 100.0, 100_000.0, &cache), 50);
    }

    #[test]
    fn missing_reference_data_is_ranging() {
        let mut cache = TickCache::new(100);
        oversold_aapl(&mut cache);
        let signal = hybrid().evaluate("AAPL", &cache);
        assert!(signal.reason.starts_with("[RANGING]"));
    }

    #[test]
    fn cooldown_survives_regime_flip() {
        let mut strategy = hybrid_with_recheck(Duration::ZERO);
        let mut cache = TickCache::new(100);
        feed_spy(&mut cache, [500.0; 20]);
        oversold_aapl(&mut cache);

        let first = strategy.evaluate("AAPL", &cache);
        assert_eq!(first.action, Action::Buy);
        assert!(first.reason.starts_with("[RANGING] Oversold"), "{}", first.reason);

        // index starts trending, AAPL breaks out on 2.5x volume
        feed_spy(&mut cache, (0..20).map(|i| 500.0 + 0.2 * i as f64));
        cache.add_trade("AAPL", 103.0, 250.0, Utc::now()).unwrap();

        let second = strategy.evaluate("AAPL", &cache);
        assert_eq!(strategy.regime(), Some(Regime::Trending));
        assert_eq!(second.action, Action::Hold);
        assert_eq!(second.reason, "[TRENDING] Signal cooldown active");

        // without the earlier signal the same tape is a breakout
        let mut other = hybrid_with_recheck(Duration::ZERO);
        let fresh = other.evaluate("AAPL", &cache);
        assert_eq!(fresh.action, Action::Buy);
        assert!(fresh.reason.starts_with("[TRENDING] Breakout"), "{}", fresh.reason);
    }
}
