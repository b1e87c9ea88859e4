//! # config — อ่าน Config จาก Environment Variables
//!
//! `Config::from_env()` อ่านค่าจาก process env (หลัง `dotenvy` โหลด `.env`)
//! `Config::from_lookup()` ใช้ parser ตัวเดียวกันแต่รับ lookup function
//! เข้ามาแทน — tests ใช้ตัวนี้เพื่อไม่ต้องแตะ process env

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};

// ─── Broker ───────────────────────────────────────────────────────────────────

/// Brokerage backend ที่จะใช้
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerMode {
    /// In-memory paper account — ไม่ต้องมี API key
    Paper { starting_cash: f64 },
    /// Alpaca v2 REST API
    Alpaca {
        api_key:    String,
        secret_key: String,
        base_url:   String,
        data_url:   String,
    },
}

// ─── Risk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// มูลค่า Position สูงสุดต่อ 1 symbol (สัดส่วนของ equity)
    pub max_position_pct:   f64,
    /// ขาดทุนรายวันสูงสุดก่อน Circuit Breaker ทำงาน (สัดส่วนของ equity)
    pub max_daily_loss_pct: f64,
    /// Stop-loss ของ Bracket order (สัดส่วนจากราคาเข้า)
    pub stop_loss_pct:      f64,
    /// Take-profit ของ Bracket order (สัดส่วนจากราคาเข้า)
    pub take_profit_pct:    f64,
    /// 0.0 = รอที่ฝั่ง passive, 1.0 = ข้าม spread ทันที
    pub limit_aggression:   f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_pct:   0.10,
            max_daily_loss_pct: 0.02,
            stop_loss_pct:      0.02,
            take_profit_pct:    0.06,
            limit_aggression:   0.3,
        }
    }
}

// ─── Strategy ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Hybrid,
    MeanReversion,
    Momentum,
}

impl std::str::FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hybrid" => Ok(StrategyKind::Hybrid),
            "mean_reversion" | "meanreversion" => Ok(StrategyKind::MeanReversion),
            "momentum" | "momentum_breakout" => Ok(StrategyKind::Momentum),
            other => bail!("Unknown STRATEGY: '{other}'. Use 'hybrid', 'mean_reversion' or 'momentum'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub kind:                 StrategyKind,
    /// ห้ามยิง Signal ซ้ำใน symbol เดียวกันภายในช่วงนี้
    pub cooldown:             Duration,
    /// Signal ต้องมั่นใจอย่างน้อยเท่านี้ Orchestrator ถึงจะยิง Order
    pub confidence_threshold: f64,
    /// คำนวณ Regime ใหม่ได้ไม่เกินรอบละครั้ง
    pub regime_recheck:       Duration,
    /// ดัชนีอ้างอิงสำหรับ RegimeDetector
    pub regime_reference:     String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind:                 StrategyKind::Hybrid,
            cooldown:             Duration::from_secs(300),
            confidence_threshold: 0.7,
            regime_recheck:       Duration::from_secs(3600),
            regime_reference:     "SPY".to_string(),
        }
    }
}

// ─── Schedule ─────────────────────────────────────────────────────────────────

/// รอบเวลาของ periodic tasks
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub position_sync: Duration,
    pub pnl_check:     Duration,
    pub health_check:  Duration,
    /// ใช้ทั้งตอนรอตลาดเปิด และตอนเช็คว่าตลาดปิดหรือยัง
    pub market_poll:   Duration,
    /// ไม่มี Tick เข้ามานานเกินนี้ → Health check เตือน
    pub stale_feed:    Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            position_sync: Duration::from_secs(60),
            pnl_check:     Duration::from_secs(300),
            health_check:  Duration::from_secs(120),
            market_poll:   Duration::from_secs(60),
            stale_feed:    Duration::from_secs(30),
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Config ทั้งหมดที่ระบบต้องการ
#[derive(Debug, Clone)]
pub struct Config {
    pub broker:            BrokerMode,
    pub risk:              RiskConfig,
    pub strategy:          StrategyConfig,
    pub schedule:          ScheduleConfig,
    pub watchlist:         Vec<String>,
    pub cache_window_size: usize,
    pub alert_buffer_size: usize,
    pub bind_addr:         SocketAddr,
    /// None = dev mode (ไม่ตรวจ X-API-Key)
    pub api_key:           Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // ── Broker ────────────────────────────────────────────────────────────
        let mode = get("BROKER_MODE").unwrap_or_else(|| "paper".to_string()).to_lowercase();
        let broker = match mode.as_str() {
            "paper" => BrokerMode::Paper {
                starting_cash: parse_or(&get, "PAPER_STARTING_CASH", 100_000.0)?,
            },
            "alpaca" => BrokerMode::Alpaca {
                api_key: get("ALPACA_API_KEY")
                    .context("ALPACA_API_KEY is required when BROKER_MODE=alpaca")?,
                secret_key: get("ALPACA_SECRET_KEY")
                    .context("ALPACA_SECRET_KEY is required when BROKER_MODE=alpaca")?,
                base_url: get("ALPACA_BASE_URL")
                    .unwrap_or_else(|| "https://paper-api.alpaca.markets".to_string()),
                data_url: get("ALPACA_DATA_URL")
                    .unwrap_or_else(|| "https://data.alpaca.markets".to_string()),
            },
            other => bail!("Unknown BROKER_MODE: '{other}'. Use 'paper' or 'alpaca'"),
        };

        // ── Risk ──────────────────────────────────────────────────────────────
        let defaults = RiskConfig::default();
        let risk = RiskConfig {
            max_position_pct:   fraction(&get, "MAX_POSITION_PCT", defaults.max_position_pct)?,
            max_daily_loss_pct: fraction(&get, "MAX_DAILY_LOSS_PCT", defaults.max_daily_loss_pct)?,
            stop_loss_pct:      fraction(&get, "STOP_LOSS_PCT", defaults.stop_loss_pct)?,
            take_profit_pct:    fraction(&get, "TAKE_PROFIT_PCT", defaults.take_profit_pct)?,
            limit_aggression:   unit(&get, "LIMIT_AGGRESSION", defaults.limit_aggression)?,
        };

        // ── Strategy ──────────────────────────────────────────────────────────
        let kind = match get("STRATEGY") {
            Some(raw) => raw.parse()?,
            None => StrategyKind::Hybrid,
        };
        let strategy = StrategyConfig {
            kind,
            cooldown:             secs(&get, "SIGNAL_COOLDOWN_SECS", 300)?,
            confidence_threshold: unit(&get, "CONFIDENCE_THRESHOLD", 0.7)?,
            regime_recheck:       secs(&get, "REGIME_RECHECK_SECS", 3600)?,
            regime_reference:     get("REGIME_REFERENCE_SYMBOL")
                .unwrap_or_else(|| "SPY".to_string())
                .to_uppercase(),
        };

        // ── Schedule ──────────────────────────────────────────────────────────
        let schedule = ScheduleConfig {
            position_sync: positive_secs(&get, "POSITION_SYNC_SECS", 60)?,
            pnl_check:     positive_secs(&get, "PNL_CHECK_SECS", 300)?,
            health_check:  positive_secs(&get, "HEALTH_CHECK_SECS", 120)?,
            market_poll:   positive_secs(&get, "MARKET_POLL_SECS", 60)?,
            stale_feed:    secs(&get, "STALE_FEED_SECS", 30)?,
        };

        // ── Watchlist ─────────────────────────────────────────────────────────
        let watchlist: Vec<String> = get("WATCHLIST")
            .unwrap_or_else(|| "SPY,QQQ,AAPL,MSFT,TSLA".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if watchlist.is_empty() {
            bail!("WATCHLIST must contain at least one symbol");
        }

        let cache_window_size: usize = parse_or(&get, "CACHE_WINDOW_SIZE", 1000)?;
        if cache_window_size == 0 {
            bail!("CACHE_WINDOW_SIZE must be > 0");
        }

        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        Ok(Self {
            broker,
            risk,
            strategy,
            schedule,
            watchlist,
            cache_window_size,
            alert_buffer_size: parse_or(&get, "ALERT_BUFFER_SIZE", 200)?,
            bind_addr,
            api_key: get("API_KEY"),
        })
    }

    /// Watchlist + regime reference (ต้อง subscribe ด้วยเสมอ)
    pub fn subscriptions(&self) -> Vec<String> {
        let mut symbols = self.watchlist.clone();
        if !symbols.contains(&self.strategy.regime_reference) {
            symbols.push(self.strategy.regime_reference.clone());
        }
        symbols
    }
}

// ─── Parse Helpers ────────────────────────────────────────────────────────────

fn parse_or<G, T>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be a number (got '{raw}')")),
        None => Ok(default),
    }
}

/// สัดส่วนต้องอยู่ใน (0, 1]
fn fraction<G>(get: &G, key: &str, default: f64) -> anyhow::Result<f64>
where
    G: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_or(get, key, default)?;
    if !(value > 0.0 && value <= 1.0) {
        bail!("{key} must be within (0, 1] (got {value})");
    }
    Ok(value)
}

/// ค่าต้องอยู่ใน [0, 1]
fn unit<G>(get: &G, key: &str, default: f64) -> anyhow::Result<f64>
where
    G: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_or(get, key, default)?;
    if !(0.0..=1.0).contains(&value) {
        bail!("{key} must be within [0, 1] (got {value})");
    }
    Ok(value)
}

fn secs<G>(get: &G, key: &str, default: u64) -> anyhow::Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    Ok(Duration::from_secs(parse_or(get, key, default)?))
}

fn positive_secs<G>(get: &G, key: &str, default: u64) -> anyhow::Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let d = secs(get, key, default)?;
    if d.is_zero() {
        bail!("{key} must be > 0");
    }
    Ok(d)
}
