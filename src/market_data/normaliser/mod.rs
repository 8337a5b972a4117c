// Normalization registry: canonical <-> exchange spellings for pairs,
// channels and order options, plus timestamp units.
//
// Tables are loaded once per exchange at startup and only read afterwards,
// so a loaded `Registry` can be shared behind an `Arc` without locking.

pub mod channels;
pub mod exchange;
pub mod options;
pub mod pairs;
pub mod timestamp;

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tracing::{debug, error};

pub use channels::{CanonicalChannel, NativeChannel};
pub use exchange::Exchange;
pub use options::{OptionRepr, ParamValue, TradingOption};
pub use pairs::PAIR_SEPARATOR;
pub use timestamp::RawTimestamp;

use crate::error::{FeedError, FeedResult};
use options::OptionCell;

/// Bitfinex funding symbols are single currencies prefixed with this.
pub const FUNDING_PREFIX: char = 'f';

#[derive(Debug, Default, Clone)]
pub struct Registry {
    // canonical pair -> exchange -> native pair
    std_to_exchange: HashMap<String, HashMap<Exchange, String>>,
    // native pair -> canonical pair
    exchange_to_std: HashMap<String, String>,
    loaded: HashSet<Exchange>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every listed exchange loaded from the built-in universe.
    pub fn with_exchanges(exchanges: &[Exchange]) -> Self {
        let mut registry = Self::new();
        for exchange in exchanges {
            registry.load(*exchange);
        }
        registry
    }

    /// Load the built-in pair mapping for `exchange`. No-op for exchanges
    /// that validate pairs dynamically.
    pub fn load(&mut self, exchange: Exchange) {
        if exchange.has_dynamic_pairs() {
            return;
        }
        self.load_mapping(exchange, pairs::builtin_pairs(exchange));
    }

    /// Load an externally supplied canonical -> native mapping.
    pub fn load_mapping<I, S, N>(&mut self, exchange: Exchange, mapping: I)
    where
        I: IntoIterator<Item = (S, N)>,
        S: Into<String>,
        N: Into<String>,
    {
        if exchange.has_dynamic_pairs() {
            return;
        }
        let mut count = 0usize;
        for (std, native) in mapping {
            let (std, native) = (std.into(), native.into());
            self.exchange_to_std.insert(native.clone(), std.clone());
            self.std_to_exchange.entry(std).or_default().insert(exchange, native);
            count += 1;
        }
        self.loaded.insert(exchange);
        debug!(exchange = %exchange, pairs = count, "Loaded pair mapping");
    }

    pub fn is_loaded(&self, exchange: Exchange) -> bool {
        exchange.has_dynamic_pairs() || self.loaded.contains(&exchange)
    }

    pub fn pair_to_exchange(&self, pair: &str, exchange: Exchange) -> FeedResult<String> {
        if exchange.has_dynamic_pairs() {
            return Ok(pair.to_string());
        }
        let unsupported = || FeedError::UnsupportedTradingPair { pair: pair.to_string(), exchange };
        match self.std_to_exchange.get(pair) {
            Some(by_exchange) => by_exchange.get(&exchange).cloned().ok_or_else(unsupported),
            None if exchange == Exchange::Bitfinex && !pair.contains(PAIR_SEPARATOR) => {
                Ok(format!("{FUNDING_PREFIX}{pair}"))
            }
            None => Err(unsupported()),
        }
    }

    /// Reverse lookup. Unmapped pairs are not an error: newly listed
    /// instruments show up on live feeds all the time.
    pub fn pair_to_canonical(&self, native: &str) -> Option<String> {
        if let Some(std) = self.exchange_to_std.get(native) {
            return Some(std.clone());
        }
        native.strip_prefix(FUNDING_PREFIX).filter(|rest| !rest.is_empty()).map(str::to_string)
    }

    /// Canonical spelling for a pair seen on `exchange`'s wire, falling back
    /// to the native spelling when nothing maps it.
    pub fn pair_from_exchange(&self, exchange: Exchange, native: &str) -> String {
        if exchange.has_dynamic_pairs() {
            return native.to_string();
        }
        self.pair_to_canonical(native).unwrap_or_else(|| native.to_string())
    }

    /// Native subscription channel for a canonical channel name. Poloniex
    /// subscribes per pair, so a name outside the channel table is tried as a pair.
    pub fn channel_to_exchange(&self, exchange: Exchange, channel: &str) -> FeedResult<String> {
        match channel.parse::<CanonicalChannel>() {
            Ok(canonical) => self.channel_for(exchange, canonical),
            Err(()) if exchange == Exchange::Poloniex => self.pair_to_exchange(channel, exchange),
            Err(()) => Err(unsupported_feed(channel, exchange)),
        }
    }

    pub fn channel_for(&self, exchange: Exchange, channel: CanonicalChannel) -> FeedResult<String> {
        match channels::native_channel(channel, exchange) {
            Some(NativeChannel::Name(name)) => Ok(name.to_string()),
            Some(NativeChannel::Id(id)) => Ok(id.to_string()),
            Some(NativeChannel::Unsupported) | None => Err(unsupported_feed(channel.as_str(), exchange)),
        }
    }

    pub fn trading_option_to_exchange(&self, exchange: Exchange, option: &str) -> FeedResult<OptionRepr> {
        let unsupported = || FeedError::UnsupportedTradingOption { option: option.to_string(), exchange };
        let option = option.parse::<TradingOption>().map_err(|_| unsupported())?;
        match options::option_cell(option, exchange) {
            Some(OptionCell::Supported(repr)) => Ok(repr),
            Some(OptionCell::Unsupported) | None => Err(unsupported()),
        }
    }

    pub fn normalize_timestamp(&self, exchange: Exchange, raw: &RawTimestamp) -> FeedResult<Decimal> {
        timestamp::normalize_timestamp(exchange, raw)
    }
}

fn unsupported_feed(channel: &str, exchange: Exchange) -> FeedError {
    error!(exchange = %exchange, channel, "{} is not supported on {}", channel, exchange);
    FeedError::UnsupportedDataFeed { channel: channel.to_string(), exchange }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::with_exchanges(&[Exchange::Coinbase, Exchange::Kraken, Exchange::Bitfinex, Exchange::Poloniex])
    }

    #[test]
    fn test_pair_round_trip() {
        let registry = registry();
        for exchange in [Exchange::Coinbase, Exchange::Kraken, Exchange::Bitfinex] {
            let native = registry.pair_to_exchange("BTC-USD", exchange).unwrap();
            assert_eq!(registry.pair_to_canonical(&native).as_deref(), Some("BTC-USD"));
        }
        assert_eq!(registry.pair_to_exchange("BTC-USD", Exchange::Kraken).unwrap(), "XBT/USD");
    }

    #[test]
    fn test_unknown_pair_is_rejected() {
        let registry = registry();
        let err = registry.pair_to_exchange("DOGE-USD", Exchange::Coinbase).unwrap_err();
        assert!(matches!(err, FeedError::UnsupportedTradingPair { exchange: Exchange::Coinbase, .. }));

        // Listed canonically, but not on Poloniex.
        let err = registry.pair_to_exchange("BTC-EUR", Exchange::Poloniex).unwrap_err();
        assert!(matches!(err, FeedError::UnsupportedTradingPair { .. }));
    }

    #[test]
    fn test_bitfinex_funding_symbols() {
        let registry = registry();
        assert_eq!(registry.pair_to_exchange("USD", Exchange::Bitfinex).unwrap(), "fUSD");
        assert!(registry.pair_to_exchange("USD", Exchange::Coinbase).is_err());
        assert_eq!(registry.pair_to_canonical("fUSD").as_deref(), Some("USD"));
    }

    #[test]
    fn test_unmapped_reverse_lookup_is_soft() {
        let registry = registry();
        assert_eq!(registry.pair_to_canonical("NEWCOIN-USD"), None);
        assert_eq!(registry.pair_to_canonical(""), None);
        assert_eq!(registry.pair_from_exchange(Exchange::Coinbase, "NEWCOIN-USD"), "NEWCOIN-USD");
    }

    #[test]
    fn test_dynamic_exchanges_pass_through() {
        let registry = Registry::new();
        assert!(registry.is_loaded(Exchange::Bitmex));
        assert!(!registry.is_loaded(Exchange::Coinbase));
        assert_eq!(registry.pair_to_exchange("XBTUSD", Exchange::Bitmex).unwrap(), "XBTUSD");
        assert_eq!(registry.pair_from_exchange(Exchange::Bitmex, "fooUSD"), "fooUSD");
    }

    #[test]
    fn test_lookup_before_load_fails() {
        let registry = Registry::new();
        assert!(registry.pair_to_exchange("BTC-USD", Exchange::Coinbase).is_err());
    }

    #[test]
    fn test_channel_lookup() {
        let registry = registry();
        assert_eq!(registry.channel_to_exchange(Exchange::Bitmex, "l2_book").unwrap(), "orderBookL2");
        assert_eq!(registry.channel_to_exchange(Exchange::Poloniex, "ticker").unwrap(), "1002");

        let err = registry.channel_to_exchange(Exchange::Bitmex, "l3_book").unwrap_err();
        assert!(matches!(err, FeedError::UnsupportedDataFeed { exchange: Exchange::Bitmex, .. }));

        let err = registry.channel_for(Exchange::Binance, CanonicalChannel::Volume).unwrap_err();
        assert!(matches!(err, FeedError::UnsupportedDataFeed { .. }));

        assert!(registry.channel_to_exchange(Exchange::Coinbase, "BTC-USD").is_err());
    }

    #[test]
    fn test_poloniex_pair_as_channel() {
        let registry = registry();
        assert_eq!(registry.channel_to_exchange(Exchange::Poloniex, "ETH-BTC").unwrap(), "BTC_ETH");
        let err = registry.channel_to_exchange(Exchange::Poloniex, "DOGE-BTC").unwrap_err();
        assert!(matches!(err, FeedError::UnsupportedTradingPair { .. }));
    }

    #[test]
    fn test_trading_options() {
        let registry = registry();
        assert_eq!(
            registry.trading_option_to_exchange(Exchange::Gemini, "limit").unwrap(),
            OptionRepr::Name("exchange limit")
        );
        assert_eq!(
            registry.trading_option_to_exchange(Exchange::Coinbase, "fill-or-kill").unwrap(),
            OptionRepr::Param { key: "time_in_force", value: ParamValue::Str("FOK") }
        );
        for (exchange, option) in [
            (Exchange::Gemini, "market"),
            (Exchange::Bitmex, "limit"),
            (Exchange::Kraken, "good-till-date"),
        ] {
            let err = registry.trading_option_to_exchange(exchange, option).unwrap_err();
            assert!(matches!(err, FeedError::UnsupportedTradingOption { .. }));
        }
    }

    #[test]
    fn test_externally_supplied_mapping() {
        let mut registry = Registry::new();
        registry.load_mapping(Exchange::Binance, [("DOGE-USDT", "DOGEUSDT")]);
        assert!(registry.is_loaded(Exchange::Binance));
        assert_eq!(registry.pair_to_exchange("DOGE-USDT", Exchange::Binance).unwrap(), "DOGEUSDT");
        assert_eq!(registry.pair_to_canonical("DOGEUSDT").as_deref(), Some("DOGE-USDT"));
    }
}
