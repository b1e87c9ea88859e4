//! # events
//!
//! Defines [`BotEvent`] — ทุก Event ที่ Orchestrator broadcast ออกไปยัง
//! dashboard ผ่าน `/ws/monitor`
//!
//! ใช้ `tokio::sync::broadcast::Sender<String>` โดยแปลงเป็น JSON String
//! ก่อนส่ง ทุก subscriber ได้ payload เดียวกัน

use serde::Serialize;

use crate::models::{BotState, OrderRecord, SessionSummary, Signal};
use crate::notifier::Alert;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotEvent {
    /// State machine transition
    StateChanged {
        from: BotState,
        to:   BotState,
    },

    /// Signal ผ่าน confidence threshold แล้ว — กำลังจะส่ง Order
    SignalActed {
        signal: Signal,
    },

    /// Broker รับ Order แล้ว
    OrderSubmitted {
        record: Box<OrderRecord>,
    },

    /// Pre-trade risk gate ปฏิเสธ
    OrderRejected {
        symbol: String,
        reason: String,
    },

    /// Broker ส่งไม่ถึง / ตอบ error
    OrderFailed {
        symbol: String,
        error:  String,
    },

    /// Circuit Breaker ทำงาน — กำลัง liquidate
    CircuitBreaker {
        daily_pnl: f64,
        floor:     f64,
    },

    /// Health check รอบละ `HEALTH_CHECK_SECS`
    HealthReport {
        trades_processed:  u64,
        signals_evaluated: u64,
        orders_submitted:  u64,
        open_positions:    usize,
        /// None = ยังไม่เคยได้รับ Tick
        secs_since_tick:   Option<i64>,
        stale:             bool,
    },

    /// Notifier alert (mirror ของ AlertHub)
    Alert {
        alert: Alert,
    },

    /// สรุปท้าย session
    SessionSummary {
        summary: SessionSummary,
    },
}

impl BotEvent {
    /// แปลงเป็น JSON String สำหรับส่งผ่าน WebSocket
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged() {
        let json = BotEvent::StateChanged { from: BotState::Startup, to: BotState::Running }.to_json();
        assert_eq!(json, r#"{"event":"STATE_CHANGED","from":"STARTUP","to":"RUNNING"}"#);
    }
}
