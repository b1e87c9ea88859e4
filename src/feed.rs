//! # feed — MarketFeed
//!
//! Push interface ระหว่าง stream bridge กับ Orchestrator
//!
//! ```text
//! POST /api/feed/{trade,quote} ──▶ MarketFeed::publish
//!                                    ├─▶ taps (PaperBroker marks, …)
//!                                    └─▶ mpsc ──▶ Orchestrator (เฉพาะ symbol ที่ subscribe)
//! ```
//!
//! Per-symbol ordering = ลำดับที่ publish (mpsc เป็น FIFO)

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::models::MarketEvent;

/// Observer that sees every published event, subscribed or not.
#[async_trait]
pub trait MarketTap: Send + Sync {
    async fn on_event(&self, event: &MarketEvent);
}

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the orchestrator.
    Delivered,
    /// Symbol not subscribed (or subscriptions cleared).
    Ignored,
}

#[derive(Debug, thiserror::Error)]
#[error("market feed receiver is closed")]
pub struct FeedClosed;

pub struct MarketFeed {
    tx:            mpsc::Sender<MarketEvent>,
    subscriptions: RwLock<BTreeSet<String>>,
    taps:          Vec<Arc<dyn MarketTap>>,
}

impl MarketFeed {
    /// Feed plus the receiving half the orchestrator drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MarketEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let feed = Self {
            tx,
            subscriptions: RwLock::new(BTreeSet::new()),
            taps: Vec::new(),
        };
        (feed, rx)
    }

    pub fn with_tap(mut self, tap: Arc<dyn MarketTap>) -> Self {
        self.taps.push(tap);
        self
    }

    pub async fn subscribe(&self, symbols: &[String]) {
        let mut subs = self.subscriptions.write().await;
        subs.extend(symbols.iter().map(|s| s.trim().to_uppercase()));
        info!(symbols = ?subs, "📡 Subscribed to trades + quotes");
    }

    pub async fn unsubscribe_all(&self) {
        self.subscriptions.write().await.clear();
        info!("📡 Unsubscribed from all symbols");
    }

    pub async fn is_subscribed(&self, symbol: &str) -> bool {
        self.subscriptions.read().await.contains(&symbol.trim().to_uppercase())
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.read().await.iter().cloned().collect()
    }

    /// Normalise the symbol, fan the event out to taps, then queue it if the
    /// symbol is subscribed. Waits for channel capacity rather than dropping ticks.
    pub async fn publish(&self, mut event: MarketEvent) -> Result<Delivery, FeedClosed> {
        event.normalize_symbol();
        for tap in &self.taps {
            tap.on_event(&event).await;
        }

        if !self.is_subscribed(event.symbol()).await {
            debug!(symbol = %event.symbol(), "Tick for unsubscribed symbol ignored");
            return Ok(Delivery::Ignored);
        }

        self.tx.send(event).await.map_err(|_| FeedClosed)?;
        Ok(Delivery::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeTick;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn trade(symbol: &str, price: f64) -> MarketEvent {
        MarketEvent::Trade(TradeTick { symbol: symbol.into(), price, size: 1.0, timestamp: Utc::now() })
    }

    #[derive(Default)]
    struct CountingTap(AtomicUsize);

    #[async_trait]
    impl MarketTap for CountingTap {
        async fn on_event(&self, _event: &MarketEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn only_subscribed_symbols_reach_the_receiver() {
        let tap = Arc::new(CountingTap::default());
        let (feed, mut rx) = MarketFeed::new(8);
        let feed = feed.with_tap(tap.clone());
        feed.subscribe(&["aapl".to_string()]).await;

        assert_eq!(feed.publish(trade("MSFT", 400.0)).await.unwrap(), Delivery::Ignored);
        assert_eq!(feed.publish(trade("AAPL", 100.0)).await.unwrap(), Delivery::Delivered);
        assert_eq!(feed.publish(trade("AAPL", 101.0)).await.unwrap(), Delivery::Delivered);
        assert_eq!(tap.0.load(Ordering::SeqCst), 3);

        let prices: Vec<f64> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .into_iter()
            .map(|e| match e {
                MarketEvent::Trade(t) => t.price,
                MarketEvent::Quote(_) => unreachable!(),
            })
            .collect();
        assert_eq!(prices, vec![100.0, 101.0]);
    }

    #[tokio::test]
    async fn lowercase_publisher_is_normalised() {
        let (feed, mut rx) = MarketFeed::new(8);
        feed.subscribe(&["AAPL".to_string()]).await;
        assert!(feed.is_subscribed("aapl").await);

        assert_eq!(feed.publish(trade(" aapl", 100.0)).await.unwrap(), Delivery::Delivered);
        assert_eq!(rx.recv().await.unwrap().symbol(), "AAPL");
    }

    #[tokio::test]
    async fn unsubscribe_all_stops_delivery() {
        let (feed, _rx) = MarketFeed::new(8);
        feed.subscribe(&["SPY".to_string()]).await;
        feed.unsubscribe_all().await;
        assert!(feed.subscriptions().await.is_empty());
        assert_eq!(feed.publish(trade("SPY", 500.0)).await.unwrap(), Delivery::Ignored);
    }

    #[tokio::test]
    async fn closed_receiver_is_reported() {
        let (feed, rx) = MarketFeed::new(8);
        feed.subscribe(&["SPY".to_string()]).await;
        drop(rx);
        assert!(feed.publish(trade("SPY", 500.0)).await.is_err());
    }
}
