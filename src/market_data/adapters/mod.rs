// Shared traits + normalized events for exchange feeds

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::engine::types::BookUpdate;
use crate::error::{FeedError, FeedResult};
use crate::market_data::normaliser::{CanonicalChannel, Exchange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub feed: Exchange,
    pub pair: String,
    pub side: TradeSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub order_id: String,
    pub timestamp: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funding {
    pub feed: Exchange,
    pub pair: String,
    pub timestamp: Decimal,
    pub interval: String,
    pub rate: Decimal,
    pub rate_daily: Decimal,
}

/// Instrument row as the exchange sent it, with `timestamp` rewritten to
/// seconds and the canonical pair alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub feed: Exchange,
    pub pair: String,
    pub timestamp: Decimal,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

// Everything a feed hands downstream, already normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    Trade(Trade),
    Book { feed: Exchange, update: BookUpdate },
    Funding(Funding),
    Instrument(Instrument),
}

impl MarketEvent {
    pub fn channel(&self) -> CanonicalChannel {
        match self {
            MarketEvent::Trade(_) => CanonicalChannel::Trades,
            MarketEvent::Book { update, .. } => update.channel,
            MarketEvent::Funding(_) => CanonicalChannel::Funding,
            MarketEvent::Instrument(_) => CanonicalChannel::Instrument,
        }
    }

    pub fn feed(&self) -> Exchange {
        match self {
            MarketEvent::Trade(t) => t.feed,
            MarketEvent::Book { feed, .. } => *feed,
            MarketEvent::Funding(f) => f.feed,
            MarketEvent::Instrument(i) => i.feed,
        }
    }

    pub fn pair(&self) -> &str {
        match self {
            MarketEvent::Trade(t) => &t.pair,
            MarketEvent::Book { update, .. } => &update.pair,
            MarketEvent::Funding(f) => &f.pair,
            MarketEvent::Instrument(i) => &i.pair,
        }
    }
}

/// Downstream callback. Awaited before the next message is processed, so
/// events for a pair arrive in the order the exchange sent them.
#[async_trait::async_trait]
pub trait EventSink: Send {
    async fn publish(&mut self, event: MarketEvent) -> FeedResult<()>;
}

#[async_trait::async_trait]
impl EventSink for mpsc::Sender<MarketEvent> {
    async fn publish(&mut self, event: MarketEvent) -> FeedResult<()> {
        self.send(event).await.map_err(|_| FeedError::SinkClosed)
    }
}

#[async_trait::async_trait]
impl EventSink for mpsc::UnboundedSender<MarketEvent> {
    async fn publish(&mut self, event: MarketEvent) -> FeedResult<()> {
        self.send(event).map_err(|_| FeedError::SinkClosed)
    }
}

/// Source of the symbols an exchange currently trades (a REST call in production).
#[async_trait::async_trait]
pub trait SymbolSource: Send + Sync {
    async fn active_symbols(&self) -> FeedResult<Vec<String>>;
}

#[async_trait::async_trait]
impl SymbolSource for Vec<String> {
    async fn active_symbols(&self) -> FeedResult<Vec<String>> {
        Ok(self.clone())
    }
}

/// One exchange's message dispatcher, driven by the router's connection loop.
#[async_trait::async_trait]
pub trait Feed: Send {
    fn id(&self) -> Exchange;

    fn address(&self) -> &str;

    /// Called once per (re)connect before any message: resets session state
    /// and returns the subscribe request to send.
    fn on_subscribe(&mut self) -> FeedResult<String>;

    async fn on_message(&mut self, raw: &str, timestamp: Decimal, sink: &mut dyn EventSink) -> FeedResult<()>;
}

pub mod bitmex;
pub mod bitmex_types;
