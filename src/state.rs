//! # state
//!
//! AppState ที่ Axum handler ทุกตัวใช้ร่วมกัน
//!
//! Orchestrator เป็นเจ้าของข้อมูลจริงทั้งหมด (cache, positions, P&L)
//! HTTP layer ได้แค่:
//! * ส่ง Tick เข้า [`MarketFeed`]
//! * ส่ง [`ControlCommand`] ผ่าน mpsc
//! * อ่าน snapshot ล่าสุดจาก `watch` channel
//! * subscribe `broadcast` สำหรับ WebSocket

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use crate::engine::orchestrator::ControlCommand;
use crate::error::AppError;
use crate::feed::MarketFeed;
use crate::models::BotStatus;
use crate::notifier::AlertHub;

// ─── AppState ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    // ── Feed Ingress ──────────────────────────────────────────────────────────
    pub feed: Arc<MarketFeed>,

    // ── Operator Control ──────────────────────────────────────────────────────
    /// Kill switch / shutdown ไปยัง Orchestrator
    pub control_tx: mpsc::Sender<ControlCommand>,

    // ── Monitor ───────────────────────────────────────────────────────────────
    /// BotStatus ล่าสุด (Orchestrator publish หลังทุก event)
    pub status_rx: watch::Receiver<BotStatus>,
    /// Pre-serialized BotEvent JSON สำหรับ `/ws/monitor`
    pub broadcast_tx: broadcast::Sender<String>,
    pub alerts: Arc<AlertHub>,

    // ── Auth ──────────────────────────────────────────────────────────────────
    /// None = dev mode (ไม่ตรวจ X-API-Key)
    pub api_key: Option<String>,
}

impl AppState {
    /// Clone ของ snapshot ล่าสุด (ไม่ถือ borrow ของ watch ไว้)
    pub fn status(&self) -> BotStatus {
        self.status_rx.borrow().clone()
    }

    /// ส่ง command ไปยัง Orchestrator — Err ถ้า session จบไปแล้ว
    pub async fn send_control(&self, command: ControlCommand) -> Result<(), AppError> {
        self.control_tx
            .send(command)
            .await
            .map_err(|_| AppError::Unavailable("orchestrator is not running".to_string()))
    }
}

/// Convenience alias used by every handler.
pub type SharedState = Arc<AppState>;
