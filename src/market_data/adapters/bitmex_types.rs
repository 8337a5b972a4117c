// Source: https://www.bitmex.com/app/wsAPI (realtime tables) and /api/v1/instrument/active
//
// Frames are parsed into `serde_json::Value` first with arbitrary precision
// numbers, so prices and sizes reach `Decimal` without a float in between.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FeedError, FeedResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Table {
    Trade,
    OrderBookL2,
    Funding,
    Instrument,
    Other(String),
}

impl From<&str> for Table {
    fn from(value: &str) -> Self {
        match value {
            "trade" => Table::Trade,
            "orderBookL2" => Table::OrderBookL2,
            "funding" => Table::Funding,
            "instrument" => Table::Instrument,
            other => Table::Other(other.to_string()),
        }
    }
}

/// A decoded frame, classified by which top-level key it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    Info(Value),
    Subscribe { success: bool, body: Value },
    Error(Value),
    Data { table: Table, action: String, data: Vec<Value> },
}

impl WsMessage {
    pub fn parse(raw: &str) -> FeedResult<WsMessage> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut obj) = value else {
            return Err(FeedError::MalformedMessage(format!("expected a JSON object, got {raw}")));
        };

        if obj.contains_key("info") {
            return Ok(WsMessage::Info(Value::Object(obj)));
        }
        if obj.contains_key("subscribe") {
            let success = obj.get("success").and_then(Value::as_bool).unwrap_or(false);
            return Ok(WsMessage::Subscribe { success, body: Value::Object(obj) });
        }
        if obj.contains_key("error") {
            return Ok(WsMessage::Error(Value::Object(obj)));
        }

        let table = match obj.get("table").and_then(Value::as_str) {
            Some(t) => Table::from(t),
            None => return Err(FeedError::MalformedMessage(format!("frame without table: {raw}"))),
        };
        // The book needs the action to know what the rows mean; other tables only read rows.
        let action = match obj.get("action").and_then(Value::as_str) {
            Some(action) => action.to_string(),
            None if table == Table::OrderBookL2 => {
                return Err(FeedError::MalformedMessage(format!("{table:?} frame without action: {raw}")))
            }
            None => String::new(),
        };
        let data = match obj.remove("data") {
            Some(Value::Array(rows)) => rows,
            Some(_) => return Err(FeedError::MalformedMessage(format!("{table:?} data is not an array"))),
            None => return Err(FeedError::MalformedMessage(format!("{table:?} frame without data: {raw}"))),
        };
        Ok(WsMessage::Data { table, action, data })
    }
}

/// Decode one table row, naming the table in the error.
pub fn row<T: serde::de::DeserializeOwned>(table: &str, value: Value) -> FeedResult<T> {
    serde_json::from_value(value).map_err(|e| FeedError::MalformedMessage(format!("{table} row: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRow {
    pub timestamp: String,
    pub symbol: String,
    pub side: String,
    pub size: Decimal,
    pub price: Decimal,
    #[serde(rename = "trdMatchID")]
    pub trd_match_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BookRow {
    pub symbol: String,
    pub side: String,
    pub id: u64,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub size: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRow {
    pub timestamp: String,
    pub symbol: String,
    pub funding_interval: String,
    pub funding_rate: Decimal,
    pub funding_rate_daily: Decimal,
}

pub type InstrumentRow = Map<String, Value>;

#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub op: String,
    pub args: Vec<String>,
}

// Types for REST GET /instrument/active
#[derive(Debug, Deserialize)]
pub struct ActiveInstrument {
    pub symbol: String,
    // we ignore the other fields for now
}
