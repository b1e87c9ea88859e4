//! # broker
//!
//! Brokerage seam — ทุกอย่างที่ core ถาม/สั่ง broker ผ่าน trait [`Broker`]
//!
//! | impl            | ใช้เมื่อ                                    |
//! |-----------------|---------------------------------------------|
//! | [`AlpacaBroker`] | `BROKER_MODE=alpaca` — Alpaca v2 REST API  |
//! | [`PaperBroker`]  | `BROKER_MODE=paper` (default) และใน tests  |

pub mod alpaca;
pub mod paper;

use async_trait::async_trait;

use crate::error::BrokerError;
use crate::models::{
    Account, BrokerPosition, LatestQuote, LatestTrade, MarketClock, OpenOrder, OrderAck, OrderRequest,
};

pub use alpaca::AlpacaBroker;
pub use paper::PaperBroker;

#[async_trait]
pub trait Broker: Send + Sync {
    async fn account(&self) -> Result<Account, BrokerError>;

    async fn clock(&self) -> Result<MarketClock, BrokerError>;

    async fn latest_quote(&self, symbol: &str) -> Result<LatestQuote, BrokerError>;

    async fn latest_trade(&self, symbol: &str) -> Result<LatestTrade, BrokerError>;

    /// Authoritative position list.
    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError>;

    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>, BrokerError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    /// Returns how many orders were cancelled.
    async fn cancel_all_orders(&self) -> Result<usize, BrokerError>;

    async fn close_position(&self, symbol: &str) -> Result<(), BrokerError>;

    /// Returns how many positions were closed.
    async fn close_all_positions(&self) -> Result<usize, BrokerError>;
}
