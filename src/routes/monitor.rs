//! # routes::monitor
//!
//! **Monitor Loop** — Endpoints สำหรับ Dashboard
//!
//! ## Endpoints
//!
//! | Method    | Path                          | Description                               |
//! |-----------|-------------------------------|-------------------------------------------|
//! | GET (WS)  | `/ws/monitor`                 | WebSocket real-time BotEvent stream       |
//! | GET       | `/api/monitor/status`         | BotStatus ล่าสุด                          |
//! | GET       | `/api/monitor/alerts`         | Alert ล่าสุด (`?limit=N`, ใหม่สุดก่อน)      |
//! | GET       | `/api/monitor/cache/:symbol`  | TickCache statistics ของ symbol           |
//! | GET       | `/health`                     | Liveness (ไม่ต้อง Auth)                    |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{error::AppError, state::SharedState};

const DEFAULT_ALERT_LIMIT: usize = 50;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// Upgrade HTTP → WebSocket แล้ว subscribe broadcast channel
///
/// ทุก BotEvent จะถูกส่งมาเป็น JSON text frame
pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    // subscribe ก่อนอ่าน snapshot → ไม่พลาด event ที่เกิดระหว่างนั้น
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── ส่ง Snapshot ปัจจุบันทันทีที่ต่อ ─────────────────────────────────────
    let snapshot = json!({
        "event":  "SNAPSHOT",
        "status": state.status(),
        "alerts": state.alerts.recent(DEFAULT_ALERT_LIMIT),
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return; // Client ปิดก่อน snapshot ส่งได้
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST Monitoring Endpoints ────────────────────────────────────────────────

/// GET /api/monitor/status
pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":     true,
        "status": state.status(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

/// GET /api/monitor/alerts?limit=N
pub async fn get_alerts(
    State(state): State<SharedState>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let alerts = state.alerts.recent(query.limit.unwrap_or(DEFAULT_ALERT_LIMIT));
    Json(json!({
        "ok":     true,
        "count":  alerts.len(),
        "alerts": alerts,
    }))
}

/// GET /api/monitor/cache/:symbol — อ่านจาก snapshot ไม่แตะ cache จริง
pub async fn get_cache_stats(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = symbol.to_uppercase();
    let stats = state
        .status()
        .cache
        .remove(&symbol)
        .ok_or_else(|| AppError::NotFound(format!("no ticks cached for {symbol}")))?;

    Ok(Json(json!({
        "ok":         true,
        "statistics": stats,
    })))
}

/// GET /health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.status();
    Json(json!({
        "ok":           true,
        "state":        status.state,
        "last_tick_at": status.last_tick_at,
    }))
}

#[cfg(test)]
mod tests {
    use crate::cache::TickCache;
    use crate::models::BotState;
    use crate::notifier::{Notifier, Priority};
    use crate::routes::tests::{get_json, Fixture};
    use axum::http::StatusCode;
    use chrono::Utc;

    #[tokio::test]
    async fn status_reflects_latest_snapshot() {
        let fx = Fixture::new(None);
        fx.status_tx.send_modify(|s| {
            s.state = BotState::Running;
            s.trades_processed = 7;
        });

        let (status, body) = get_json(&fx.state, "/api/monitor/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "RUNNING");
        assert_eq!(body["status"]["trades_processed"], 7);
    }

    #[tokio::test]
    async fn cache_stats_by_symbol() {
        let fx = Fixture::new(None);
        let mut cache = TickCache::new(10);
        cache.add_trade("AAPL", 100.0, 10.0, Utc::now()).unwrap();
        cache.add_trade("AAPL", 102.0, 10.0, Utc::now()).unwrap();
        fx.status_tx.send_modify(|s| {
            s.cache.insert("AAPL".into(), cache.statistics("AAPL"));
        });

        let (status, body) = get_json(&fx.state, "/api/monitor/cache/aapl", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["statistics"]["num_trades"], 2);
        assert_eq!(body["statistics"]["last_price"], 102.0);

        let (status, body) = get_json(&fx.state, "/api/monitor/cache/TSLA", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn alerts_newest_first_with_limit() {
        let fx = Fixture::new(None);
        fx.state.alerts.notify("first", Priority::Low);
        fx.state.alerts.notify("second", Priority::High);
        fx.state.alerts.notify("third", Priority::Medium);

        let (status, body) = get_json(&fx.state, "/api/monitor/alerts?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["alerts"][0]["message"], "third");
        assert_eq!(body["alerts"][1]["priority"], "high");
    }

    #[tokio::test]
    async fn api_key_guards_everything_but_health() {
        let fx = Fixture::new(Some("s3cret"));

        let (status, _) = get_json(&fx.state, "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_json(&fx.state, "/api/monitor/status", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);

        let (status, _) = get_json(&fx.state, "/api/monitor/status", Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get_json(&fx.state, "/api/monitor/status", Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
