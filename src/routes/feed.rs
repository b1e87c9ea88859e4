//! # routes::feed
//!
//! Tick ingress สำหรับ stream bridge (brokerage WebSocket → HTTP push)
//!
//! | Method | Path              | Description                         |
//! |--------|-------------------|-------------------------------------|
//! | POST   | `/api/feed/trade` | Trade print → MarketFeed            |
//! | POST   | `/api/feed/quote` | Bid/ask update → MarketFeed         |
//!
//! Payload ที่ผิด (ราคา ≤ 0, ask < bid, symbol ว่าง) ตอบ 400 และไม่ถึง Orchestrator

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::{
    error::AppError,
    feed::Delivery,
    models::{MarketEvent, Quote, QuoteTick, Trade, TradeTick},
    state::SharedState,
};

// ─── POST /api/feed/trade ─────────────────────────────────────────────────────

/// ### Request body (JSON)
/// ```json
/// { "symbol": "AAPL", "price": 189.42, "size": 100, "timestamp": "2025-01-02T14:30:00Z" }
/// ```
/// `timestamp` ไม่ใส่ได้ (ใช้เวลาที่รับ)
pub async fn ingest_trade(
    State(state): State<SharedState>,
    Json(mut tick): Json<TradeTick>,
) -> Result<impl IntoResponse, AppError> {
    tick.symbol = tick.symbol.trim().to_uppercase();
    Trade::new(&tick.symbol, tick.price, tick.size, tick.timestamp)?;

    let symbol = tick.symbol.clone();
    let delivery = publish(&state, MarketEvent::Trade(tick)).await?;
    Ok(Json(json!({
        "ok":        true,
        "symbol":    symbol,
        "delivered": delivery == Delivery::Delivered,
    })))
}

// ─── POST /api/feed/quote ─────────────────────────────────────────────────────

/// ### Request body (JSON)
/// ```json
/// { "symbol": "AAPL", "bid": 189.40, "ask": 189.44, "bid_size": 300, "ask_size": 200 }
/// ```
pub async fn ingest_quote(
    State(state): State<SharedState>,
    Json(mut tick): Json<QuoteTick>,
) -> Result<impl IntoResponse, AppError> {
    tick.symbol = tick.symbol.trim().to_uppercase();
    Quote::new(&tick.symbol, tick.bid, tick.ask, tick.bid_size, tick.ask_size, tick.timestamp)?;

    let symbol = tick.symbol.clone();
    let delivery = publish(&state, MarketEvent::Quote(tick)).await?;
    Ok(Json(json!({
        "ok":        true,
        "symbol":    symbol,
        "delivered": delivery == Delivery::Delivered,
    })))
}

async fn publish(state: &SharedState, event: MarketEvent) -> Result<Delivery, AppError> {
    state
        .feed
        .publish(event)
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::{post_json, Fixture};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn subscribed_trade_reaches_orchestrator() {
        let mut fx = Fixture::new(None);
        fx.state.feed.subscribe(&["AAPL".to_string()]).await;

        let (status, body) = post_json(
            &fx.state,
            "/api/feed/trade",
            Some(json!({ "symbol": "aapl", "price": 189.42, "size": 100.0 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["delivered"], true);
        assert_eq!(body["symbol"], "AAPL");
        assert!(fx.market_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unsubscribed_tick_is_accepted_but_not_delivered() {
        let mut fx = Fixture::new(None);
        let (status, body) = post_json(
            &fx.state,
            "/api/feed/quote",
            Some(json!({ "symbol": "MSFT", "bid": 400.0, "ask": 400.1 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["delivered"], false);
        assert!(fx.market_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_ticks_are_rejected() {
        let fx = Fixture::new(None);
        fx.state.feed.subscribe(&["AAPL".to_string()]).await;

        let (status, body) = post_json(
            &fx.state,
            "/api/feed/trade",
            Some(json!({ "symbol": "AAPL", "price": 0.0, "size": 10.0 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);

        let (status, _) = post_json(
            &fx.state,
            "/api/feed/quote",
            Some(json!({ "symbol": "AAPL", "bid": 101.0, "ask": 100.0 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
