//! # engine::regime — RegimeDetector
//!
//! จำแนกสภาพตลาดจาก reference index (default SPY) 20 trades ล่าสุด
//!
//! ```text
//! vol   = σ(returns) × √252          (annualised)
//! slope = (last − first) / N
//!
//! vol > 25%                    → VOLATILE
//! |slope| > 0.1  &&  vol < 15% → TRENDING
//! otherwise                    → RANGING
//! ```
//!
//! คำนวณใหม่ไม่เกินรอบละครั้ง (`recheck`) — ระหว่างนั้นคืนค่าเดิม
//! ข้อมูลไม่พอ → RANGING เสมอ (ไม่เดาว่า TRENDING/VOLATILE)

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::TickCache;
use crate::engine::mean_reversion::mean_std;

const WINDOW: usize = 20;
const TRADING_DAYS: f64 = 252.0;
const VOLATILE_ABOVE: f64 = 0.25;
const TRENDING_BELOW: f64 = 0.15;
const TRENDING_SLOPE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Trending => write!(f, "TRENDING"),
            Regime::Ranging  => write!(f, "RANGING"),
            Regime::Volatile => write!(f, "VOLATILE"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegimeDetector {
    reference:  String,
    recheck:    Duration,
    current:    Regime,
    last_check: Option<DateTime<Utc>>,
}

impl RegimeDetector {
    pub fn new(reference: &str, recheck: Duration) -> Self {
        Self {
            reference:  reference.to_string(),
            recheck,
            current:    Regime::Ranging,
            last_check: None,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Last computed regime (no recomputation).
    pub fn current(&self) -> Regime {
        self.current
    }

    pub fn detect(&mut self, cache: &TickCache) -> Regime {
        self.detect_at(cache, Utc::now())
    }

    pub fn detect_at(&mut self, cache: &TickCache, now: DateTime<Utc>) -> Regime {
        if let Some(last) = self.last_check {
            let fresh = now
                .signed_duration_since(last)
                .to_std()
                .map_or(true, |elapsed| elapsed < self.recheck);
            if fresh {
                return self.current;
            }
        }

        if cache.trade_count(&self.reference) < WINDOW {
            warn!(
                "⚠️  Insufficient {} data for regime detection, using RANGING",
                self.reference
            );
            return Regime::Ranging;
        }

        let prices: Vec<f64> = cache
            .recent_trades(&self.reference, WINDOW)
            .iter()
            .map(|t| t.price)
            .collect();
        let (regime, volatility, slope) = classify(&prices);

        self.current = regime;
        self.last_check = Some(now);
        info!(
            "🧭 Regime detected: {regime} (volatility: {:.2}%, slope: {slope:.4})",
            volatility * 100.0
        );
        regime
    }
}

/// `(regime, annualised volatility, slope)` for a price window.
fn classify(prices: &[f64]) -> (Regime, f64, f64) {
    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let (_, std) = mean_std(&returns);
    let volatility = std * TRADING_DAYS.sqrt();

    let slope = match (prices.first(), prices.last()) {
        (Some(first), Some(last)) => (last - first) / prices.len() as f64,
        _ => 0.0,
    };

    let regime = if volatility > VOLATILE_ABOVE {
        Regime::Volatile
    } else if slope.abs() > TRENDING_SLOPE && volatility < TRENDING_BELOW {
        Regime::Trending
    } else {
        Regime::Ranging
    };
    (regime, volatility, slope)
}
