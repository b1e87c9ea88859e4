//! # notifier — Alerts
//!
//! `notify(message, priority)` — fire-and-forget, ห้าม block, ไม่มี retry
//!
//! [`AlertHub`] คือ Notifier ตัวจริงของระบบ:
//! 1. log ผ่าน `tracing` ตาม priority
//! 2. เก็บลง ring buffer (dashboard ดึงย้อนหลังได้ที่ `/api/monitor/alerts`)
//! 3. broadcast เป็น [`BotEvent::Alert`] ไปยัง WebSocket clients

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::events::BotEvent;

// ─── Priority ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low      => "low",
            Priority::Medium   => "medium",
            Priority::High     => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

// ─── Notifier ─────────────────────────────────────────────────────────────────

/// Best-effort alert sink. Implementations must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, priority: Priority);
}

/// One delivered alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub message:   String,
    pub priority:  Priority,
    pub timestamp: DateTime<Utc>,
}

// ─── AlertHub ─────────────────────────────────────────────────────────────────

pub struct AlertHub {
    history:      Mutex<VecDeque<Alert>>,
    capacity:     usize,
    broadcast_tx: broadcast::Sender<String>,
}

impl AlertHub {
    pub fn new(capacity: usize, broadcast_tx: broadcast::Sender<String>) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            capacity: capacity.max(1),
            broadcast_tx,
        }
    }

    /// Newest first, at most `limit`.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        match self.history.lock() {
            Ok(history) => history.iter().rev().take(limit).cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().rev().take(limit).cloned().collect(),
        }
    }

    fn record(&self, alert: Alert) {
        let mut history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(alert);
    }
}

impl Notifier for AlertHub {
    fn notify(&self, message: &str, priority: Priority) {
        match priority {
            Priority::Low      => info!(%priority, "🔔 {message}"),
            Priority::Medium   => warn!(%priority, "🔔 {message}"),
            Priority::High     => error!(%priority, "🚨 {message}"),
            Priority::Critical => error!(%priority, "🛑 {message}"),
        }

        let alert = Alert {
            message: message.to_string(),
            priority,
            timestamp: Utc::now(),
        };

        // ไม่มี subscriber ก็ไม่เป็นไร
        let _ = self.broadcast_tx.send(BotEvent::Alert { alert: alert.clone() }.to_json());
        self.record(alert);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Captures alerts for assertions in other modules' tests.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub alerts: Mutex<Vec<(String, Priority)>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self, priority: Priority) -> Vec<String> {
            self.alerts
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, p)| *p == priority)
                .map(|(m, _)| m.clone())
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, priority: Priority) {
            self.alerts.lock().unwrap().push((message.to_string(), priority));
        }
    }

    #[test]
    fn hub_keeps_bounded_history_newest_first() {
        let (tx, _) = broadcast::channel(16);
        let hub = AlertHub::new(2, tx);
        hub.notify("one", Priority::Low);
        hub.notify("two", Priority::Medium);
        hub.notify("three", Priority::High);

        let recent = hub.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "three");
        assert_eq!(recent[1].message, "two");
        assert_eq!(hub.recent(1)[0].priority, Priority::High);
    }

    #[test]
    fn hub_broadcasts_alert_events() {
        let (tx, mut rx) = broadcast::channel(16);
        let hub = AlertHub::new(10, tx);
        hub.notify("Circuit breaker", Priority::Critical);

        let json = rx.try_recv().unwrap();
        assert!(json.contains(r#""event":"ALERT""#));
        assert!(json.contains(r#""priority":"critical""#));
    }
}
