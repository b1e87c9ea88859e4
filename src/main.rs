//! # Antigravity Equities — Real-time Trading Core
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐  POST /api/feed/{trade,quote}  ┌────────────┐  mpsc   ┌──────────────────────────┐
//!  │ Stream Bridge│ ──────────────────────────────▶│ MarketFeed │ ──────▶ │      Orchestrator        │
//!  └──────────────┘                                └────────────┘         │  TickCache → Strategy    │
//!                                                        │ tap            │  → RiskGatedExecutor ────┼──▶ Broker
//!                                                        ▼                │  (single writer)         │   (Alpaca / Paper)
//!                                                   PaperBroker marks     └──────────────────────────┘
//!                                                                            │ watch     │ broadcast
//!  ┌──────────────┐  GET /api/monitor/* · /ws/monitor                        ▼           ▼
//!  │  Dashboard   │ ◀──────────────────────────────────────────────────── BotStatus · BotEvent
//!  └──────────────┘  POST /api/control/{kill,shutdown} ──▶ ControlCommand (mpsc)
//! ```
//!
//! ## Environment Variables
//!
//! | Variable      | Default          | Description                              |
//! |---------------|------------------|------------------------------------------|
//! | `BROKER_MODE` | `paper`          | `paper` (in-memory) or `alpaca` (REST)   |
//! | `WATCHLIST`   | `SPY,QQQ,AAPL,MSFT,TSLA` | Symbols to trade                 |
//! | `STRATEGY`    | `hybrid`         | `hybrid`, `mean_reversion`, `momentum`   |
//! | `BIND_ADDR`   | `0.0.0.0:3000`   | Address Axum listens on                  |
//! | `API_KEY`     | —                | X-API-Key guard (unset = dev mode)       |
//! | `RUST_LOG`    | `antigravity_equities=debug` | Tracing filter               |
//!
//! ดูตัวแปรทั้งหมดใน [`config::Config::from_lookup`]

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod broker;
mod cache;
mod config;
mod engine;
mod error;
mod events;
mod feed;
mod models;
mod notifier;
mod routes;
mod state;

use broker::{AlpacaBroker, Broker, PaperBroker};
use config::{BrokerMode, Config};
use engine::orchestrator::{ControlCommand, Orchestrator};
use feed::MarketFeed;
use notifier::AlertHub;
use state::AppState;

/// Inbound tick buffer between the HTTP ingress and the orchestrator.
const FEED_CHANNEL_CAPACITY: usize = 4096;
const BROADCAST_CAPACITY: usize = 256;

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("antigravity_equities=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║        ANTIGRAVITY — Equities Trading Core            ║
  ║  TickCache · Signal · Risk Gate · Orchestrator        ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = Config::from_env().context("invalid configuration")?;
    info!(
        watchlist = ?config.watchlist,
        strategy  = ?config.strategy.kind,
        "⚙️  Configuration loaded"
    );

    // ── 4. Broker + Feed ──────────────────────────────────────────────────────
    let (feed, market_rx) = MarketFeed::new(FEED_CHANNEL_CAPACITY);
    let (broker, feed): (Arc<dyn Broker>, MarketFeed) = match &config.broker {
        BrokerMode::Paper { starting_cash } => {
            info!(starting_cash, "📝 Paper broker");
            let paper = Arc::new(PaperBroker::new(*starting_cash));
            (paper.clone(), feed.with_tap(paper))
        }
        BrokerMode::Alpaca { api_key, secret_key, base_url, data_url } => {
            info!(%base_url, "🏦 Alpaca broker");
            let client = reqwest::Client::builder()
                .build()
                .context("failed to build HTTP client")?;
            let alpaca = AlpacaBroker::new(client, api_key, secret_key, base_url, data_url);
            (Arc::new(alpaca), feed)
        }
    };
    let feed = Arc::new(feed);

    // ── 5. Channels + Notifier ────────────────────────────────────────────────
    let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
    let (control_tx, control_rx) = mpsc::channel(16);
    let alerts = Arc::new(AlertHub::new(config.alert_buffer_size, broadcast_tx.clone()));

    let (orchestrator, status_rx) = Orchestrator::new(
        &config,
        broker,
        feed.clone(),
        alerts.clone(),
        broadcast_tx.clone(),
    );

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let state = Arc::new(AppState {
        feed,
        control_tx: control_tx.clone(),
        status_rx,
        broadcast_tx,
        alerts,
        api_key: config.api_key.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // ── 7. Serve (background) ─────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "🚀 Antigravity server starting");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server stopped");
        }
    });

    // ── 8. Ctrl-C → graceful shutdown ─────────────────────────────────────────
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("⌨️  Ctrl-C received");
            let _ = control_tx.send(ControlCommand::Shutdown).await;
        }
    });

    // ── 9. Run the session ────────────────────────────────────────────────────
    let summary = orchestrator.run(market_rx, control_rx).await?;
    info!(
        final_state = %summary.final_state,
        reason      = %summary.reason,
        daily_pnl   = summary.daily_pnl,
        "🏁 Session finished"
    );

    Ok(())
}
