//! Domain models shared across the entire trading core.

pub mod order;
pub mod position;
pub mod signal;
pub mod status;
pub mod tick;

pub use order::{BracketLegs, OpenOrder, OrderAck, OrderRecord, OrderRequest, OrderSide, OrderType, TimeInForce};
pub use position::{Account, AccountSnapshot, BrokerPosition, LatestQuote, LatestTrade, MarketClock, Positions};
pub use signal::{Action, Signal};
pub use status::{BotState, BotStatus, SessionSummary};
pub use tick::{MarketEvent, Quote, QuoteTick, Trade, TradeTick};
