//! HTTP surface: tick ingress, dashboard monitor and operator controls.

pub mod control;
pub mod feed;
pub mod monitor;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_api_key, state::SharedState};

/// ทุก route + X-API-Key guard (TraceLayer / CORS ใส่ที่ `main`)
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // ── Feed Ingress ──────────────────────────────────────────────────────
        .route("/api/feed/trade",            post(feed::ingest_trade))
        .route("/api/feed/quote",            post(feed::ingest_quote))
        // ── Monitor Loop ──────────────────────────────────────────────────────
        .route("/ws/monitor",                get(monitor::ws_monitor))
        .route("/api/monitor/status",        get(monitor::get_status))
        .route("/api/monitor/alerts",        get(monitor::get_alerts))
        .route("/api/monitor/cache/:symbol", get(monitor::get_cache_stats))
        .route("/health",                    get(monitor::health))
        // ── Operator Controls ─────────────────────────────────────────────────
        .route("/api/control/kill",          post(control::kill_switch))
        .route("/api/control/shutdown",      post(control::shutdown))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tokio::sync::{broadcast, mpsc, watch};
    use tower::ServiceExt;

    use super::build_router;
    use crate::auth::API_KEY_HEADER;
    use crate::engine::orchestrator::ControlCommand;
    use crate::feed::MarketFeed;
    use crate::models::{BotStatus, MarketEvent};
    use crate::notifier::AlertHub;
    use crate::state::{AppState, SharedState};

    /// AppState wired to channels the test holds the other ends of.
    pub(crate) struct Fixture {
        pub state:      SharedState,
        pub market_rx:  mpsc::Receiver<MarketEvent>,
        pub control_rx: mpsc::Receiver<ControlCommand>,
        pub status_tx:  watch::Sender<BotStatus>,
    }

    impl Fixture {
        pub fn new(api_key: Option<&str>) -> Self {
            let (feed, market_rx) = MarketFeed::new(16);
            let (control_tx, control_rx) = mpsc::channel(4);
            let (status_tx, status_rx) = watch::channel(BotStatus::new("Hybrid"));
            let (broadcast_tx, _) = broadcast::channel(16);
            let state = Arc::new(AppState {
                feed: Arc::new(feed),
                control_tx,
                status_rx,
                alerts: Arc::new(AlertHub::new(10, broadcast_tx.clone())),
                broadcast_tx,
                api_key: api_key.map(str::to_string),
            });
            Self { state, market_rx, control_rx, status_tx }
        }
    }

    async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub(crate) async fn get_json(state: &SharedState, uri: &str, api_key: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        send(state, builder.body(Body::empty()).unwrap()).await
    }

    pub(crate) async fn post_json(
        state: &SharedState,
        uri: &str,
        body: Option<Value>,
        api_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        send(state, builder.body(body).unwrap()).await
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let fx = Fixture::new(None);
        let (status, _) = get_json(&fx.state, "/api/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
