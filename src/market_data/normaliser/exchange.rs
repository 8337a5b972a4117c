use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Exchange {
    Bitfinex,
    Gemini,
    Poloniex,
    HitBtc,
    Bitstamp,
    Coinbase,
    Bitmex,
    Kraken,
    KrakenFutures,
    Binance,
    Exx,
    Huobi,
    HuobiUs,
    HuobiDm,
    OkCoin,
    Okex,
    Coinbene,
    Bybit,
    Ftx,
    Deribit,
}

impl Exchange {
    pub const ALL: [Exchange; 20] = [
        Exchange::Bitfinex,
        Exchange::Gemini,
        Exchange::Poloniex,
        Exchange::HitBtc,
        Exchange::Bitstamp,
        Exchange::Coinbase,
        Exchange::Bitmex,
        Exchange::Kraken,
        Exchange::KrakenFutures,
        Exchange::Binance,
        Exchange::Exx,
        Exchange::Huobi,
        Exchange::HuobiUs,
        Exchange::HuobiDm,
        Exchange::OkCoin,
        Exchange::Okex,
        Exchange::Coinbene,
        Exchange::Bybit,
        Exchange::Ftx,
        Exchange::Deribit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Bitfinex => "BITFINEX",
            Exchange::Gemini => "GEMINI",
            Exchange::Poloniex => "POLONIEX",
            Exchange::HitBtc => "HITBTC",
            Exchange::Bitstamp => "BITSTAMP",
            Exchange::Coinbase => "COINBASE",
            Exchange::Bitmex => "BITMEX",
            Exchange::Kraken => "KRAKEN",
            Exchange::KrakenFutures => "KRAKEN_FUTURES",
            Exchange::Binance => "BINANCE",
            Exchange::Exx => "EXX",
            Exchange::Huobi => "HUOBI",
            Exchange::HuobiUs => "HUOBI_US",
            Exchange::HuobiDm => "HUOBI_DM",
            Exchange::OkCoin => "OKCOIN",
            Exchange::Okex => "OKEX",
            Exchange::Coinbene => "COINBENE",
            Exchange::Bybit => "BYBIT",
            Exchange::Ftx => "FTX",
            Exchange::Deribit => "DERIBIT",
        }
    }

    /// Exchanges that validate pairs themselves against a live symbol list.
    /// Their native spelling is used as-is and no static table exists.
    pub fn has_dynamic_pairs(&self) -> bool {
        matches!(self, Exchange::Bitmex | Exchange::Deribit | Exchange::KrakenFutures)
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Exchange::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == upper)
            .ok_or_else(|| FeedError::Config(format!("unknown exchange {s:?}")))
    }
}

impl TryFrom<String> for Exchange {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Exchange> for String {
    fn from(value: Exchange) -> Self {
        value.as_str().to_string()
    }
}
