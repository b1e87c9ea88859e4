//! # routes::control
//!
//! Operator controls
//!
//! | Method | Path                     | Description                                  |
//! |--------|--------------------------|----------------------------------------------|
//! | POST   | `/api/control/kill`      | Kill switch — cancel ทุก order, ปิดทุก position แล้วหยุด |
//! | POST   | `/api/control/shutdown`  | Graceful shutdown (เหมือน Ctrl-C)            |
//!
//! ทั้งสองอย่างย้อนกลับไม่ได้ภายใน session เดียวกัน

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{engine::orchestrator::ControlCommand, error::AppError, state::SharedState};

#[derive(Debug, Deserialize)]
pub struct KillBody {
    pub reason: Option<String>,
}

/// POST /api/control/kill — เปิด Kill Switch ฉุกเฉิน
pub async fn kill_switch(
    State(state): State<SharedState>,
    body: Option<Json<KillBody>>,
) -> Result<impl IntoResponse, AppError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "Manual kill via API".to_string());

    warn!(%reason, "🚨 Kill switch requested via API");
    state
        .send_control(ControlCommand::KillSwitch { reason: reason.clone() })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok":      true,
            "message": format!("Kill switch activated: {reason}"),
        })),
    ))
}

/// POST /api/control/shutdown — หยุดแบบ graceful (cancel orders, เก็บ positions)
pub async fn shutdown(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    state.send_control(ControlCommand::Shutdown).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok":      true,
            "message": "Graceful shutdown requested",
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{post_json, Fixture};

    #[tokio::test]
    async fn kill_switch_forwards_reason() {
        let mut fx = Fixture::new(None);
        let (status, body) =
            post_json(&fx.state, "/api/control/kill", Some(json!({ "reason": "fat finger" })), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["message"], "Kill switch activated: fat finger");
        assert_eq!(
            fx.control_rx.try_recv().unwrap(),
            ControlCommand::KillSwitch { reason: "fat finger".into() }
        );
    }

    #[tokio::test]
    async fn kill_switch_without_body_uses_default_reason() {
        let mut fx = Fixture::new(None);
        let (status, _) = post_json(&fx.state, "/api/control/kill", None, None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(
            fx.control_rx.try_recv().unwrap(),
            ControlCommand::KillSwitch { reason: "Manual kill via API".into() }
        );
    }

    #[tokio::test]
    async fn shutdown_is_forwarded() {
        let mut fx = Fixture::new(None);
        let (status, _) = post_json(&fx.state, "/api/control/shutdown", None, None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(fx.control_rx.try_recv().unwrap(), ControlCommand::Shutdown);
    }

    #[tokio::test]
    async fn stopped_orchestrator_is_unavailable() {
        let Fixture { state, control_rx, .. } = Fixture::new(None);
        drop(control_rx);

        let (status, body) = post_json(&state, "/api/control/shutdown", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);
    }
}
