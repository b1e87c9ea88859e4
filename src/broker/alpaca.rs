//! # broker::alpaca — AlpacaBroker
//!
//! Alpaca v2 REST API ผ่าน `reqwest`
//!
//! ## Endpoints
//! | Call                  | HTTP                                      |
//! |-----------------------|-------------------------------------------|
//! | account               | `GET    {base}/v2/account`                |
//! | clock                 | `GET    {base}/v2/clock`                  |
//! | positions             | `GET    {base}/v2/positions`              |
//! | submit_order          | `POST   {base}/v2/orders`                 |
//! | list_open_orders      | `GET    {base}/v2/orders?status=open`     |
//! | cancel_order          | `DELETE {base}/v2/orders/{id}`            |
//! | cancel_all_orders     | `DELETE {base}/v2/orders`                 |
//! | close_position        | `DELETE {base}/v2/positions/{symbol}`     |
//! | close_all_positions   | `DELETE {base}/v2/positions`              |
//! | latest_quote / trade  | `GET {data}/v2/stocks/{symbol}/…/latest`  |
//!
//! Alpaca ส่งตัวเลขเงินมาเป็น string (`"equity": "100000.00"`) — แปลงที่
//! ขอบเขตนี้ที่เดียว core เห็นแค่ `f64`

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::models::{
    Account, BrokerPosition, LatestQuote, LatestTrade, MarketClock, OpenOrder, OrderAck, OrderRequest,
    OrderSide, OrderType, TimeInForce,
};

/// ห้ามรอ broker นานกว่านี้
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── AlpacaBroker ─────────────────────────────────────────────────────────────

pub struct AlpacaBroker {
    client:     reqwest::Client,
    api_key:    String,
    secret_key: String,
    base_url:   String,
    data_url:   String,
}

impl AlpacaBroker {
    pub fn new(
        client: reqwest::Client,
        api_key: &str,
        secret_key: &str,
        base_url: &str,
        data_url: &str,
    ) -> Self {
        Self {
            client,
            api_key:    api_key.to_string(),
            secret_key: secret_key.to_string(),
            base_url:   base_url.trim_end_matches('/').to_string(),
            data_url:   data_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .timeout(REQUEST_TIMEOUT)
    }

    fn trading(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, format!("{}{path}", self.base_url))
    }

    fn data(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, format!("{}{path}", self.data_url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BrokerError> {
        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Alpaca unreachable");
            BrokerError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, body = %body, "Alpaca returned HTTP error");
            return Err(BrokerError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BrokerError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Alpaca response parse failed");
            BrokerError::Decode(e.to_string())
        })
    }
}

#[async_trait]
impl Broker for AlpacaBroker {
    async fn account(&self) -> Result<Account, BrokerError> {
        let raw: RawAccount = self.fetch(self.trading(Method::GET, "/v2/account")).await?;
        raw.try_into()
    }

    async fn clock(&self) -> Result<MarketClock, BrokerError> {
        let raw: RawClock = self.fetch(self.trading(Method::GET, "/v2/clock")).await?;
        Ok(raw.into())
    }

    async fn latest_quote(&self, symbol: &str) -> Result<LatestQuote, BrokerError> {
        let raw: RawLatestQuote = self
            .fetch(self.data(&format!("/v2/stocks/{symbol}/quotes/latest")))
            .await?;
        let q = raw.quote;
        if q.bid <= 0.0 && q.ask <= 0.0 {
            return Err(BrokerError::NoData(symbol.to_string()));
        }
        Ok(LatestQuote { bid: q.bid, ask: q.ask, bid_size: q.bid_size, ask_size: q.ask_size })
    }

    async fn latest_trade(&self, symbol: &str) -> Result<LatestTrade, BrokerError> {
        let raw: RawLatestTrade = self
            .fetch(self.data(&format!("/v2/stocks/{symbol}/trades/latest")))
            .await?;
        Ok(LatestTrade { price: raw.trade.price, size: raw.trade.size })
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let raw: Vec<RawPosition> = self.fetch(self.trading(Method::GET, "/v2/positions")).await?;
        raw.into_iter().map(BrokerPosition::try_from).collect()
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let body = RawOrderRequest::from(request);
        info!(
            symbol = %request.symbol,
            side   = %request.side,
            qty    = request.qty,
            limit  = ?request.limit_price,
            class  = ?body.order_class,
            "🚀 [ALPACA] Sending order"
        );
        let raw: RawOrder = self
            .fetch(self.trading(Method::POST, "/v2/orders").json(&body))
            .await?;
        Ok(OrderAck { order_id: raw.id, status: raw.status })
    }

    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>, BrokerError> {
        let raw: Vec<RawOrder> = self
            .fetch(self.trading(Method::GET, "/v2/orders?status=open&limit=500"))
            .await?;
        raw.into_iter().map(OpenOrder::try_from).collect()
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.send(self.trading(Method::DELETE, &format!("/v2/orders/{order_id}")))
            .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self) -> Result<usize, BrokerError> {
        let raw: Vec<serde_json::Value> =
            self.fetch(self.trading(Method::DELETE, "/v2/orders")).await?;
        debug!(count = raw.len(), "Alpaca cancel-all responded");
        Ok(raw.len())
    }

    async fn close_position(&self, symbol: &str) -> Result<(), BrokerError> {
        self.send(self.trading(Method::DELETE, &format!("/v2/positions/{symbol}")))
            .await?;
        Ok(())
    }

    async fn close_all_positions(&self) -> Result<usize, BrokerError> {
        let raw: Vec<serde_json::Value> =
            self.fetch(self.trading(Method::DELETE, "/v2/positions")).await?;
        Ok(raw.len())
    }
}

// ─── Wire Types ───────────────────────────────────────────────────────────────

fn decimal(field: &str, raw: &str) -> Result<f64, BrokerError> {
    raw.parse()
        .map_err(|_| BrokerError::Decode(format!("{field}: '{raw}' is not a number")))
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id:                 String,
    equity:             String,
    buying_power:       String,
    #[serde(default)]
    trading_blocked:    bool,
    #[serde(default)]
    pattern_day_trader: bool,
}

impl TryFrom<RawAccount> for Account {
    type Error = BrokerError;

    fn try_from(raw: RawAccount) -> Result<Self, Self::Error> {
        Ok(Account {
            account_id:         raw.id,
            equity:             decimal("equity", &raw.equity)?,
            buying_power:       decimal("buying_power", &raw.buying_power)?,
            trading_blocked:    raw.trading_blocked,
            pattern_day_trader: raw.pattern_day_trader,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawClock {
    timestamp:  DateTime<Utc>,
    is_open:    bool,
    next_open:  DateTime<Utc>,
    next_close: DateTime<Utc>,
}

impl From<RawClock> for MarketClock {
    fn from(raw: RawClock) -> Self {
        MarketClock {
            timestamp:  raw.timestamp,
            is_open:    raw.is_open,
            next_open:  raw.next_open,
            next_close: raw.next_close,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    symbol:          String,
    qty:             String,
    avg_entry_price: String,
    #[serde(default)]
    current_price:   Option<String>,
    #[serde(default)]
    unrealized_pl:   Option<String>,
}

impl TryFrom<RawPosition> for BrokerPosition {
    type Error = BrokerError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        let qty = decimal("qty", &raw.qty)?;
        let avg_entry_price = decimal("avg_entry_price", &raw.avg_entry_price)?;
        let current_price = match raw.current_price.as_deref() {
            Some(p) => decimal("current_price", p)?,
            None => avg_entry_price,
        };
        let unrealized_pnl = match raw.unrealized_pl.as_deref() {
            Some(p) => decimal("unrealized_pl", p)?,
            None => 0.0,
        };
        Ok(BrokerPosition {
            symbol: raw.symbol,
            qty: qty.trunc() as i64,
            avg_entry_price,
            current_price,
            unrealized_pnl,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id:     String,
    status: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    side:   Option<OrderSide>,
    #[serde(default)]
    qty:    Option<String>,
}

impl TryFrom<RawOrder> for OpenOrder {
    type Error = BrokerError;

    fn try_from(raw: RawOrder) -> Result<Self, Self::Error> {
        let side = raw
            .side
            .ok_or_else(|| BrokerError::Decode(format!("order {} has no side", raw.id)))?;
        let qty = match raw.qty.as_deref() {
            Some(q) => decimal("qty", q)?.trunc() as u64,
            None => 0,
        };
        Ok(OpenOrder { order_id: raw.id, symbol: raw.symbol, side, qty })
    }
}

#[derive(Debug, Deserialize)]
struct RawLatestQuote {
    quote: RawQuote,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "bp", default)]
    bid:      f64,
    #[serde(rename = "ap", default)]
    ask:      f64,
    #[serde(rename = "bs", default)]
    bid_size: f64,
    #[serde(rename = "as", default)]
    ask_size: f64,
}

#[derive(Debug, Deserialize)]
struct RawLatestTrade {
    trade: RawTrade,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "p")]
    price: f64,
    #[serde(rename = "s", default)]
    size:  f64,
}

/// `POST /v2/orders` body.
#[derive(Debug, Serialize)]
struct RawOrderRequest {
    symbol:          String,
    qty:             String,
    side:            OrderSide,
    #[serde(rename = "type")]
    order_type:      OrderType,
    time_in_force:   TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price:     Option<String>,
    client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_class:     Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit:     Option<RawTakeProfit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss:       Option<RawStopLoss>,
}

#[derive(Debug, Serialize)]
struct RawTakeProfit {
    limit_price: String,
}

#[derive(Debug, Serialize)]
struct RawStopLoss {
    stop_price: String,
}

impl From<&OrderRequest> for RawOrderRequest {
    fn from(req: &OrderRequest) -> Self {
        let price = |p: f64| format!("{p:.2}");
        Self {
            symbol:          req.symbol.clone(),
            qty:             req.qty.to_string(),
            side:            req.side,
            order_type:      req.order_type,
            time_in_force:   req.time_in_force,
            limit_price:     req.limit_price.map(price),
            client_order_id: req.client_order_id.clone(),
            order_class:     req.bracket.map(|_| "bracket"),
            take_profit:     req.bracket.map(|b| RawTakeProfit { limit_price: price(b.take_profit) }),
            stop_loss:       req.bracket.map(|b| RawStopLoss { stop_price: price(b.stop_loss) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BracketLegs;

    #[test]
    fn parses_account_string_decimals() {
        let raw: RawAccount = serde_json::from_str(
            r#"{"id":"abc","equity":"100000.50","buying_power":"200000","trading_blocked":false,
                "pattern_day_trader":true,"status":"ACTIVE"}"#,
        )
        .unwrap();
        let account = Account::try_from(raw).unwrap();
        assert_eq!(account.equity, 100_000.5);
        assert_eq!(account.buying_power, 200_000.0);
        assert!(account.pattern_day_trader);
    }

    #[test]
    fn rejects_garbage_decimals() {
        let raw: RawAccount =
            serde_json::from_str(r#"{"id":"abc","equity":"n/a","buying_power":"1"}"#).unwrap();
        assert!(matches!(Account::try_from(raw), Err(BrokerError::Decode(_))));
    }

    #[test]
    fn parses_short_position() {
        let raw: RawPosition = serde_json::from_str(
            r#"{"symbol":"TSLA","qty":"-15","avg_entry_price":"200.10","current_price":"198.00",
                "unrealized_pl":"31.50","side":"short"}"#,
        )
        .unwrap();
        let pos = BrokerPosition::try_from(raw).unwrap();
        assert_eq!(pos.qty, -15);
        assert_eq!(pos.unrealized_pnl, 31.5);
    }

    #[test]
    fn parses_latest_quote_and_clock() {
        let raw: RawLatestQuote = serde_json::from_str(
            r#"{"symbol":"AAPL","quote":{"ap":100.1,"as":3,"bp":100.0,"bs":5,"t":"2024-03-01T15:00:00Z"}}"#,
        )
        .unwrap();
        assert_eq!(raw.quote.ask, 100.1);
        assert_eq!(raw.quote.bid_size, 5.0);

        let clock: MarketClock = serde_json::from_str::<RawClock>(
            r#"{"timestamp":"2024-03-01T14:00:00Z","is_open":false,
                "next_open":"2024-03-01T14:30:00Z","next_close":"2024-03-01T21:00:00Z"}"#,
        )
        .unwrap()
        .into();
        assert_eq!(clock.minutes_to_open(), 30);
    }

    #[test]
    fn bracket_order_body_shape() {
        let request = OrderRequest {
            symbol:          "AAPL".into(),
            qty:             10,
            side:            OrderSide::Buy,
            order_type:      OrderType::Limit,
            time_in_force:   TimeInForce::Day,
            limit_price:     Some(100.03),
            bracket:         Some(BracketLegs { stop_loss: 98.0294, take_profit: 106.0318 }),
            client_order_id: "AAPL_buy_1".into(),
        };
        let body = serde_json::to_value(RawOrderRequest::from(&request)).unwrap();
        assert_eq!(body["qty"], "10");
        assert_eq!(body["type"], "limit");
        assert_eq!(body["order_class"], "bracket");
        assert_eq!(body["stop_loss"]["stop_price"], "98.03");
        assert_eq!(body["take_profit"]["limit_price"], "106.03");
    }

    #[test]
    fn market_order_omits_optional_fields() {
        let request = OrderRequest {
            symbol:          "SPY".into(),
            qty:             1,
            side:            OrderSide::Sell,
            order_type:      OrderType::Market,
            time_in_force:   TimeInForce::Day,
            limit_price:     None,
            bracket:         None,
            client_order_id: "SPY_sell_1".into(),
        };
        let body = serde_json::to_value(RawOrderRequest::from(&request)).unwrap();
        assert!(body.get("limit_price").is_none());
        assert!(body.get("order_class").is_none());
        assert_eq!(body["side"], "sell");
    }
}
