use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market_data::normaliser::CanonicalChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Book side for an exchange's order side spelling ("Buy" rests on the bid).
    pub fn from_order_side(side: &str) -> Option<Side> {
        match side {
            "Buy" | "buy" | "BUY" => Some(Side::Bid),
            "Sell" | "sell" | "SELL" => Some(Side::Ask),
            _ => None,
        }
    }
}

// (price, size); size zero in a delta means the level is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    pub fn is_removal(&self) -> bool {
        self.size.is_zero()
    }
}

/// Levels touched by one incoming message, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDelta {
    pub bid: Vec<PriceLevel>,
    pub ask: Vec<PriceLevel>,
}

impl BookDelta {
    pub fn push(&mut self, side: Side, price: Decimal, size: Decimal) {
        let level = PriceLevel::new(price, size);
        match side {
            Side::Bid => self.bid.push(level),
            Side::Ask => self.ask.push(level),
        }
    }

    pub fn side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bid.is_empty() && self.ask.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookAction {
    Partial,
    Insert,
    Update,
    Delete,
    Unknown(String),
}

impl FromStr for BookAction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "partial" => BookAction::Partial,
            "insert" => BookAction::Insert,
            "update" => BookAction::Update,
            "delete" => BookAction::Delete,
            other => BookAction::Unknown(other.to_string()),
        })
    }
}

/// One row of a book message. Price/size presence depends on the action:
/// both for partial/insert, size only for update, neither for delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEntry {
    pub pair: String,
    pub side: Side,
    pub order_id: u64,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMessage {
    pub action: BookAction,
    pub entries: Vec<BookEntry>,
}

/// What the engine hands to the sink for every applied message and pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub pair: String,
    pub channel: CanonicalChannel,
    pub forced: bool,
    pub delta: BookDelta,
    pub timestamp: Decimal,
}

/// Scope of the "partial received" gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialPolicy {
    /// One partial for any pair opens the whole session.
    #[default]
    Session,
    /// Every pair waits for its own partial.
    PerPair,
}
