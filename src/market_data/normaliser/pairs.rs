// Built-in pair universe and per-exchange spelling rules.
// Used by `Registry::load` when no externally fetched mapping is supplied.

use super::exchange::Exchange;

pub const PAIR_SEPARATOR: char = '-';

const UNIVERSE: &[(&str, &str)] = &[
    ("BTC", "USD"),
    ("ETH", "USD"),
    ("LTC", "USD"),
    ("BCH", "USD"),
    ("XRP", "USD"),
    ("BTC", "EUR"),
    ("ETH", "EUR"),
    ("BTC", "USDT"),
    ("ETH", "USDT"),
    ("LTC", "USDT"),
    ("XRP", "USDT"),
    ("ETH", "BTC"),
    ("LTC", "BTC"),
    ("XRP", "BTC"),
];

/// Quote currencies an exchange lists out of the built-in universe.
fn quotes(exchange: Exchange) -> &'static [&'static str] {
    match exchange {
        Exchange::Binance
        | Exchange::Huobi
        | Exchange::HuobiDm
        | Exchange::Okex
        | Exchange::Exx
        | Exchange::Coinbene
        | Exchange::Poloniex => &["USDT", "BTC"],
        Exchange::HuobiUs => &["USD", "USDT", "BTC"],
        Exchange::Bybit => &["USD"],
        Exchange::Coinbase | Exchange::Kraken | Exchange::Bitstamp | Exchange::Bitfinex => &["USD", "EUR", "BTC"],
        Exchange::Gemini | Exchange::HitBtc | Exchange::Ftx | Exchange::OkCoin => &["USD", "BTC"],
        Exchange::Bitmex | Exchange::Deribit | Exchange::KrakenFutures => &[],
    }
}

/// Native spelling of `base`/`quote` on `exchange`.
pub fn native_symbol(exchange: Exchange, base: &str, quote: &str) -> String {
    match exchange {
        Exchange::Coinbase | Exchange::Okex | Exchange::OkCoin => format!("{base}-{quote}"),
        Exchange::Kraken => {
            let base = if base == "BTC" { "XBT" } else { base };
            format!("{base}/{quote}")
        }
        Exchange::Ftx => format!("{base}/{quote}"),
        Exchange::Bitfinex => format!("t{base}{quote}"),
        Exchange::Gemini | Exchange::Bitstamp | Exchange::Huobi | Exchange::HuobiUs | Exchange::HuobiDm => {
            format!("{base}{quote}").to_ascii_lowercase()
        }
        Exchange::Poloniex => format!("{quote}_{base}"),
        Exchange::Exx => format!("{base}_{quote}").to_ascii_lowercase(),
        Exchange::Binance
        | Exchange::HitBtc
        | Exchange::Bybit
        | Exchange::Coinbene
        | Exchange::Bitmex
        | Exchange::Deribit
        | Exchange::KrakenFutures => format!("{base}{quote}"),
    }
}

/// Canonical -> native pairs the exchange lists out of the built-in universe.
pub fn builtin_pairs(exchange: Exchange) -> Vec<(String, String)> {
    let quotes = quotes(exchange);
    UNIVERSE
        .iter()
        .filter(|(_, quote)| quotes.contains(quote))
        .map(|(base, quote)| (format!("{base}{PAIR_SEPARATOR}{quote}"), native_symbol(exchange, base, quote)))
        .collect()
}
