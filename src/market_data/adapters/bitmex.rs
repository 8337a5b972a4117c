// BitMEX realtime feed: builds the subscription and turns table frames into MarketEvents.
//
// Book frames go through the BookEngine; trades, funding and instruments are
// stateless and normalized row by row.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use itertools::{iproduct, Itertools};
use metrics::counter;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::bitmex_types::{
    row, ActiveInstrument, BookRow, FundingRow, InstrumentRow, SubscribeRequest, Table, TradeRow, WsMessage,
};
use super::{EventSink, Feed, Funding, Instrument, MarketEvent, SymbolSource, Trade, TradeSide};
use crate::config::FeedSettings;
use crate::engine::book::BookEngine;
use crate::engine::types::{BookAction, BookEntry, BookMessage, Side};
use crate::error::{FeedError, FeedResult};
use crate::market_data::normaliser::{Exchange, RawTimestamp, Registry};

pub const WS_URL: &str = "wss://www.bitmex.com/realtime";
pub const REST_URL: &str = "https://www.bitmex.com/api/v1";

const ID: Exchange = Exchange::Bitmex;

pub struct BitmexFeed {
    address: String,
    registry: Arc<Registry>,
    // native spellings from here on
    pairs: Vec<String>,
    channels: Vec<String>,
    per_channel: BTreeMap<String, Vec<String>>,
    engine: BookEngine,
}

impl BitmexFeed {
    /// Resolve the configured selection through the registry and check every
    /// pair against `active`. Index symbols (leading '.') are never listed as
    /// active and skip the check.
    pub fn new(registry: Arc<Registry>, settings: &FeedSettings, active: &[String]) -> FeedResult<Self> {
        settings.validate()?;

        let mut per_channel: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (channel, pairs) in &settings.per_channel {
            let native = registry.channel_to_exchange(ID, channel)?;
            let slot = per_channel.entry(native).or_default();
            for pair in pairs {
                slot.push(registry.pair_to_exchange(pair, ID)?);
            }
        }

        let (pairs, channels) = if per_channel.is_empty() {
            let pairs = settings
                .pairs
                .iter()
                .map(|p| registry.pair_to_exchange(p, ID))
                .collect::<FeedResult<Vec<_>>>()?;
            let channels = settings
                .channels
                .iter()
                .map(|c| registry.channel_to_exchange(ID, c))
                .collect::<FeedResult<Vec<_>>>()?;
            (pairs.into_iter().unique().collect_vec(), channels.into_iter().unique().collect_vec())
        } else {
            let pairs = per_channel.values().flatten().cloned().unique().collect_vec();
            (pairs, per_channel.keys().cloned().collect_vec())
        };

        let active: HashSet<&str> = active.iter().map(String::as_str).collect();
        for pair in pairs.iter().filter(|p| !p.starts_with('.')) {
            if !active.contains(pair.as_str()) {
                error!(exchange = %ID, pair = %pair, "Pair is not in the active instrument list");
                return Err(FeedError::InactivePair { pair: pair.clone(), exchange: ID });
            }
        }

        info!(exchange = %ID, pairs = ?pairs, channels = ?channels, "Feed configured");
        Ok(Self {
            address: settings.ws_url.clone(),
            engine: BookEngine::new(pairs.iter().cloned(), settings.partial_policy),
            registry,
            pairs,
            channels,
            per_channel,
        })
    }

    /// Like `new`, fetching the active symbol list from `source` first.
    pub async fn from_source(
        registry: Arc<Registry>,
        settings: &FeedSettings,
        source: &dyn SymbolSource,
    ) -> FeedResult<Self> {
        let active = source.active_symbols().await?;
        debug!(exchange = %ID, symbols = active.len(), "Fetched active symbols");
        Self::new(registry, settings, &active)
    }

    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    pub fn engine(&self) -> &BookEngine {
        &self.engine
    }

    /// `channel:pair` tokens, channel-major.
    pub fn subscription_args(&self) -> Vec<String> {
        if self.per_channel.is_empty() {
            iproduct!(&self.channels, &self.pairs).map(|(c, p)| format!("{c}:{p}")).collect()
        } else {
            self.per_channel
                .iter()
                .flat_map(|(c, pairs)| pairs.iter().map(move |p| format!("{c}:{p}")))
                .collect()
        }
    }

    fn timestamp(&self, raw: String) -> FeedResult<Decimal> {
        self.registry.normalize_timestamp(ID, &RawTimestamp::Text(raw))
    }

    fn pair(&self, native: &str) -> String {
        self.registry.pair_from_exchange(ID, native)
    }

    async fn trades(&self, data: Vec<Value>, sink: &mut dyn EventSink) -> FeedResult<()> {
        let mut events = Vec::with_capacity(data.len());
        for value in data {
            let trade: TradeRow = row("trade", value)?;
            let side = match trade.side.as_str() {
                "Buy" => TradeSide::Buy,
                "Sell" => TradeSide::Sell,
                other => return Err(FeedError::MalformedMessage(format!("trade side {other:?}"))),
            };
            events.push(MarketEvent::Trade(Trade {
                feed: ID,
                pair: self.pair(&trade.symbol),
                side,
                amount: trade.size,
                price: trade.price,
                order_id: trade.trd_match_id,
                timestamp: self.timestamp(trade.timestamp)?,
            }));
        }
        publish_all(sink, events).await
    }

    async fn book(
        &mut self,
        action: &str,
        data: Vec<Value>,
        timestamp: Decimal,
        sink: &mut dyn EventSink,
    ) -> FeedResult<()> {
        let action = action.parse::<BookAction>().unwrap_or_else(|never| match never {});
        // unknown actions are logged by the engine, their rows may not decode
        let entries = if let BookAction::Unknown(_) = action {
            Vec::new()
        } else {
            data.into_iter().map(book_entry).collect::<FeedResult<Vec<_>>>()?
        };

        let updates = match self.engine.apply(&BookMessage { action, entries }, timestamp) {
            Ok(updates) => updates,
            Err(e) => {
                if let FeedError::BookDesync { .. } = e {
                    counter!("lobx_book_desync_total", "exchange" => ID.as_str()).increment(1);
                }
                return Err(e);
            }
        };
        counter!("lobx_book_updates_total", "exchange" => ID.as_str()).increment(updates.len() as u64);

        let events = updates
            .into_iter()
            .map(|mut update| {
                update.pair = self.pair(&update.pair);
                MarketEvent::Book { feed: ID, update }
            })
            .collect();
        publish_all(sink, events).await
    }

    async fn funding(&self, data: Vec<Value>, sink: &mut dyn EventSink) -> FeedResult<()> {
        let mut events = Vec::with_capacity(data.len());
        for value in data {
            let funding: FundingRow = row("funding", value)?;
            events.push(MarketEvent::Funding(Funding {
                feed: ID,
                pair: self.pair(&funding.symbol),
                timestamp: self.timestamp(funding.timestamp)?,
                interval: funding.funding_interval,
                rate: funding.funding_rate,
                rate_daily: funding.funding_rate_daily,
            }));
        }
        publish_all(sink, events).await
    }

    async fn instrument(&self, data: Vec<Value>, sink: &mut dyn EventSink) -> FeedResult<()> {
        let mut events = Vec::with_capacity(data.len());
        for value in data {
            let mut fields: InstrumentRow = row("instrument", value)?;
            let symbol = match fields.get("symbol") {
                Some(Value::String(s)) => s.clone(),
                _ => return Err(FeedError::MalformedMessage("instrument row without symbol".into())),
            };
            let raw = match fields.get("timestamp") {
                Some(Value::String(s)) => RawTimestamp::Text(s.clone()),
                Some(Value::Number(n)) => RawTimestamp::Text(n.to_string()),
                _ => return Err(FeedError::MalformedMessage(format!("instrument {symbol} without timestamp"))),
            };
            let timestamp = self.registry.normalize_timestamp(ID, &raw)?;
            let pair = self.pair(&symbol);

            fields.insert("timestamp".into(), Value::Number(timestamp.to_string().parse()?));
            fields.insert("pair".into(), Value::String(pair.clone()));
            events.push(MarketEvent::Instrument(Instrument { feed: ID, pair, timestamp, fields }));
        }
        publish_all(sink, events).await
    }
}

fn book_entry(value: Value) -> FeedResult<BookEntry> {
    let entry: BookRow = row("orderBookL2", value)?;
    let side = Side::from_order_side(&entry.side)
        .ok_or_else(|| FeedError::MalformedMessage(format!("book side {:?}", entry.side)))?;
    Ok(BookEntry { pair: entry.symbol, side, order_id: entry.id, price: entry.price, size: entry.size })
}

async fn publish_all(sink: &mut dyn EventSink, events: Vec<MarketEvent>) -> FeedResult<()> {
    for event in events {
        sink.publish(event).await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl Feed for BitmexFeed {
    fn id(&self) -> Exchange {
        ID
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn on_subscribe(&mut self) -> FeedResult<String> {
        self.engine.reset();
        let args = self.subscription_args();
        info!(exchange = %ID, subscriptions = args.len(), "Subscribing");
        let request = SubscribeRequest { op: "subscribe".into(), args };
        Ok(serde_json::to_string(&request)?)
    }

    async fn on_message(&mut self, raw: &str, timestamp: Decimal, sink: &mut dyn EventSink) -> FeedResult<()> {
        counter!("lobx_messages_total", "exchange" => ID.as_str()).increment(1);

        match WsMessage::parse(raw)? {
            WsMessage::Info(body) => info!(exchange = %ID, %body, "Info message"),
            WsMessage::Subscribe { success: true, body } => debug!(exchange = %ID, %body, "Subscribed"),
            // the channels that did succeed keep streaming
            WsMessage::Subscribe { success: false, body } => error!(exchange = %ID, %body, "Failed to subscribe"),
            WsMessage::Error(body) => error!(exchange = %ID, %body, "Error message from exchange"),
            WsMessage::Data { table, action, data } => match table {
                Table::Trade => self.trades(data, sink).await?,
                Table::OrderBookL2 => self.book(&action, data, timestamp, sink).await?,
                Table::Funding => self.funding(data, sink).await?,
                Table::Instrument => self.instrument(data, sink).await?,
                Table::Other(name) => warn!(exchange = %ID, table = %name, "Unhandled table"),
            },
        }
        Ok(())
    }
}

/// Active instrument list from the REST API.
#[derive(Debug, Clone)]
pub struct BitmexRest {
    client: reqwest::Client,
    api: String,
}

impl BitmexRest {
    pub fn new(api: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api: api.into() }
    }
}

impl Default for BitmexRest {
    fn default() -> Self {
        Self::new(REST_URL)
    }
}

#[async_trait::async_trait]
impl SymbolSource for BitmexRest {
    async fn active_symbols(&self) -> FeedResult<Vec<String>> {
        let url = format!("{}/instrument/active", self.api.trim_end_matches('/'));
        let instruments: Vec<ActiveInstrument> =
            self.client.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(instruments.into_iter().map(|i| i.symbol).collect())
    }
}
