//! # error
//!
//! Centralised error types.
//!
//! The taxonomy keeps "this order is unsafe" ([`ValidationError`]) apart from
//! "the broker is unreachable" ([`BrokerError`]) so callers never have to
//! parse a message to tell them apart. Missing market data is NOT an error
//! anywhere in the core — accessors return `Option` instead.
//!
//! [`AppError`] is the HTTP-facing wrapper: Axum's `IntoResponse` impl turns
//! it into a structured JSON body so the feed bridge / dashboard always gets
//! a machine-readable response even on failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── Tick Errors ──────────────────────────────────────────────────────────────

/// A malformed tick. Rejected at the cache door because one bad print
/// corrupts every statistic derived from the window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidTickError {
    #[error("tick has an empty symbol")]
    EmptySymbol,

    #[error("{symbol}: trade price must be > 0 (got {price})")]
    NonPositivePrice { symbol: String, price: f64 },

    #[error("{symbol}: trade size must be > 0 (got {size})")]
    NonPositiveSize { symbol: String, size: f64 },

    #[error("{symbol}: bid must be >= 0 (got {bid})")]
    NegativeBid { symbol: String, bid: f64 },

    #[error("{symbol}: ask {ask} is below bid {bid}")]
    CrossedQuote { symbol: String, bid: f64, ask: f64 },
}

// ─── Validation Errors ────────────────────────────────────────────────────────

/// Why the pre-trade gate refused an order. Expected and recoverable:
/// the rejection is logged and alerted, trading continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Market is closed - cannot place orders")]
    MarketClosed,

    #[error("Position size ${value:.2} exceeds {pct:.1}% limit (${limit:.2})")]
    ExceedsPositionLimit { value: f64, limit: f64, pct: f64 },

    #[error("Daily loss limit hit: ${daily_pnl:.2} ({pct:.1}% of account, floor ${floor:.2})")]
    DailyLossLimit { daily_pnl: f64, floor: f64, pct: f64 },

    #[error("Insufficient buying power: ${available:.2} < ${required:.2} required")]
    InsufficientBuyingPower { available: f64, required: f64 },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u64),

    #[error("Cannot get current price for {0}")]
    PriceUnavailable(String),
}

// ─── Broker Errors ────────────────────────────────────────────────────────────

/// Transport / API failure talking to the brokerage. Logged, alerted at
/// "high", and simply retried by the next scheduled cycle.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Transport(String),

    #[error("broker HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("broker response could not be decoded: {0}")]
    Decode(String),

    #[error("broker rejected request: {0}")]
    Rejected(String),

    #[error("no market data for {0}")]
    NoData(String),
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BrokerError::Decode(err.to_string())
        } else {
            BrokerError::Transport(err.to_string())
        }
    }
}

// ─── Startup Errors ───────────────────────────────────────────────────────────

/// Fatal: the session never reaches RUNNING.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("account is blocked from trading")]
    TradingBlocked,

    #[error("brokerage unreachable at startup: {0}")]
    Broker(#[from] BrokerError),
}

// ─── HTTP-facing Error ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource does not exist (yet).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The orchestrator is gone (stopped, or its inbox is closed).
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<InvalidTickError> for AppError {
    fn from(err: InvalidTickError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg)  => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg)    => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
