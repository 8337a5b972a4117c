// Per-exchange timestamp units -> seconds since the epoch as an exact decimal.
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::exchange::Exchange;
use crate::error::{FeedError, FeedResult};

/// A timestamp as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Number(Decimal),
    Text(String),
}

impl From<Decimal> for RawTimestamp {
    fn from(value: Decimal) -> Self {
        RawTimestamp::Number(value)
    }
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Number(Decimal::from(value))
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampUnit {
    /// ISO-8601 text, or a number already in seconds.
    Iso,
    Millis,
    Micros,
    Identity,
}

fn unit(exchange: Exchange) -> TimestampUnit {
    match exchange {
        Exchange::Bitmex
        | Exchange::Coinbase
        | Exchange::HitBtc
        | Exchange::OkCoin
        | Exchange::Okex
        | Exchange::Bybit
        | Exchange::Ftx => TimestampUnit::Iso,
        Exchange::Huobi
        | Exchange::HuobiUs
        | Exchange::HuobiDm
        | Exchange::Bitfinex
        | Exchange::Coinbene
        | Exchange::Deribit
        | Exchange::Binance
        | Exchange::Gemini => TimestampUnit::Millis,
        Exchange::Bitstamp => TimestampUnit::Micros,
        Exchange::Kraken | Exchange::KrakenFutures | Exchange::Poloniex | Exchange::Exx => TimestampUnit::Identity,
    }
}

fn invalid(exchange: Exchange, raw: &str) -> FeedError {
    FeedError::InvalidTimestamp { raw: raw.to_string(), exchange }
}

fn parse_iso(exchange: Exchange, text: &str) -> FeedResult<Decimal> {
    if let Ok(seconds) = Decimal::from_str(text) {
        return Ok(seconds);
    }
    // No offset means UTC.
    let parsed = match DateTime::parse_from_rfc3339(text) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|_| invalid(exchange, text))?,
    };
    let seconds = Decimal::from(parsed.timestamp());
    let fraction = Decimal::new(i64::from(parsed.timestamp_subsec_nanos()), 9);
    Ok((seconds + fraction).normalize())
}

fn as_number(exchange: Exchange, raw: &RawTimestamp) -> FeedResult<Decimal> {
    match raw {
        RawTimestamp::Number(n) => Ok(*n),
        RawTimestamp::Text(text) => Decimal::from_str(text.trim()).map_err(|_| invalid(exchange, text)),
    }
}

pub fn normalize_timestamp(exchange: Exchange, raw: &RawTimestamp) -> FeedResult<Decimal> {
    match unit(exchange) {
        TimestampUnit::Iso => match raw {
            RawTimestamp::Number(n) => Ok(*n),
            RawTimestamp::Text(text) => parse_iso(exchange, text.trim()),
        },
        TimestampUnit::Millis => Ok((as_number(exchange, raw)? / Decimal::from(1_000)).normalize()),
        TimestampUnit::Micros => Ok((as_number(exchange, raw)? / Decimal::from(1_000_000)).normalize()),
        TimestampUnit::Identity => as_number(exchange, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_millis_and_micros() {
        let ms = normalize_timestamp(Exchange::Binance, &RawTimestamp::from(1_500_000_000_123)).unwrap();
        assert_eq!(ms, dec("1500000000.123"));

        let us = normalize_timestamp(Exchange::Bitstamp, &RawTimestamp::from(1_500_000_000_123_456)).unwrap();
        assert_eq!(us, dec("1500000000.123456"));
    }

    #[test]
    fn test_iso_text() {
        let ts = normalize_timestamp(Exchange::Bitmex, &RawTimestamp::from("2018-05-19T12:25:26.632Z")).unwrap();
        assert_eq!(ts, dec("1526732726.632"));
    }

    #[test]
    fn test_iso_text_without_offset_is_utc() {
        let naive = normalize_timestamp(Exchange::Coinbase, &RawTimestamp::from("2018-05-19T12:25:26.632")).unwrap();
        assert_eq!(naive, dec("1526732726.632"));
        let spaced = normalize_timestamp(Exchange::Coinbase, &RawTimestamp::from("2018-05-19 12:25:26")).unwrap();
        assert_eq!(spaced, dec("1526732726"));
        let offset = normalize_timestamp(Exchange::Okex, &RawTimestamp::from("2018-05-19T14:25:26.632+02:00")).unwrap();
        assert_eq!(offset, naive);
    }

    #[test]
    fn test_identity_fallback() {
        let raw = RawTimestamp::Number(dec("1526732726.5"));
        assert_eq!(normalize_timestamp(Exchange::Kraken, &raw).unwrap(), dec("1526732726.5"));
        assert_eq!(normalize_timestamp(Exchange::Poloniex, &RawTimestamp::from("42")).unwrap(), dec("42"));
    }

    #[test]
    fn test_garbage_text_is_rejected() {
        let err = normalize_timestamp(Exchange::Coinbase, &RawTimestamp::from("yesterday")).unwrap_err();
        assert!(matches!(err, FeedError::InvalidTimestamp { exchange: Exchange::Coinbase, .. }));
    }
}
