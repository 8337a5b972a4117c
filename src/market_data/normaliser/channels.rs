// Canonical data channels and their per-exchange subscription names.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::exchange::Exchange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalChannel {
    Trades,
    L2Book,
    L3Book,
    Ticker,
    Volume,
    Funding,
    Instrument,
    TradesSwap,
    TickerSwap,
    L2BookSwap,
}

impl CanonicalChannel {
    pub const ALL: [CanonicalChannel; 10] = [
        CanonicalChannel::Trades,
        CanonicalChannel::L2Book,
        CanonicalChannel::L3Book,
        CanonicalChannel::Ticker,
        CanonicalChannel::Volume,
        CanonicalChannel::Funding,
        CanonicalChannel::Instrument,
        CanonicalChannel::TradesSwap,
        CanonicalChannel::TickerSwap,
        CanonicalChannel::L2BookSwap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalChannel::Trades => "trades",
            CanonicalChannel::L2Book => "l2_book",
            CanonicalChannel::L3Book => "l3_book",
            CanonicalChannel::Ticker => "ticker",
            CanonicalChannel::Volume => "volume",
            CanonicalChannel::Funding => "funding",
            CanonicalChannel::Instrument => "instrument",
            CanonicalChannel::TradesSwap => "trades_swap",
            CanonicalChannel::TickerSwap => "ticker_swap",
            CanonicalChannel::L2BookSwap => "l2_book_swap",
        }
    }
}

impl fmt::Display for CanonicalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalChannel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalChannel::ALL.iter().copied().find(|c| c.as_str() == s).ok_or(())
    }
}

/// One cell of the channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeChannel {
    Name(&'static str),
    /// Poloniex numbers its ticker and volume channels.
    Id(u32),
    Unsupported,
}

/// Row lookup. `None` means the exchange has no cell for this channel at all.
pub(crate) fn native_channel(channel: CanonicalChannel, exchange: Exchange) -> Option<NativeChannel> {
    use CanonicalChannel as C;
    use Exchange as E;
    use NativeChannel::{Id, Name, Unsupported};

    let cell = match (channel, exchange) {
        (C::L2Book, E::Bitfinex) => Name("book-P0-F0-100"),
        (C::L2Book, E::Poloniex) => Name("l2_book"),
        (C::L2Book, E::HitBtc) => Name("subscribeOrderbook"),
        (C::L2Book, E::Coinbase) => Name("level2"),
        (C::L2Book, E::Bitmex) => Name("orderBookL2"),
        (C::L2Book, E::Bitstamp) => Name("order_book"),
        (C::L2Book, E::Kraken | E::KrakenFutures | E::Deribit) => Name("book"),
        (C::L2Book, E::Binance) => Name("depth"),
        (C::L2Book, E::Exx) => Name("ENTRUST_ADD"),
        (C::L2Book, E::Huobi | E::HuobiUs | E::HuobiDm) => Name("depth.step0"),
        (C::L2Book, E::OkCoin | E::Okex) => Name("spot/depth"),
        (C::L2Book, E::Coinbene | E::Gemini) => Name("l2_book"),
        (C::L2Book, E::Bybit) => Name("order_book_25L1"),
        (C::L2Book, E::Ftx) => Name("orderbook"),

        (C::L3Book, E::Bitfinex) => Name("book-R0-F0-100"),
        (C::L3Book, E::Bitstamp) => Name("detail_order_book"),
        (C::L3Book, E::Coinbase) => Name("full"),
        (C::L3Book, E::Coinbene | E::Deribit) => return None,
        // Poloniex serves L3 only when the pair itself is used as the channel.
        (C::L3Book, _) => Unsupported,

        (C::Trades, E::Poloniex | E::Coinbene | E::Gemini) => Name("trades"),
        (C::Trades, E::HitBtc) => Name("subscribeTrades"),
        (C::Trades, E::Bitstamp) => Name("live_trades"),
        (C::Trades, E::Bitfinex | E::Deribit | E::Ftx) => Name("trades"),
        (C::Trades, E::Coinbase) => Name("matches"),
        (C::Trades, E::Bitmex | E::Kraken | E::KrakenFutures | E::Bybit) => Name("trade"),
        (C::Trades, E::Binance) => Name("aggTrade"),
        (C::Trades, E::Exx) => Name("TRADE"),
        (C::Trades, E::Huobi | E::HuobiUs | E::HuobiDm) => Name("trade.detail"),
        (C::Trades, E::OkCoin | E::Okex) => Name("spot/trade"),

        (C::Ticker, E::Poloniex) => Id(1002),
        (C::Ticker, E::HitBtc) => Name("subscribeTicker"),
        (C::Ticker, E::Bitfinex | E::Coinbase | E::Binance | E::Deribit | E::Ftx) => Name("ticker"),
        (C::Ticker, E::Kraken | E::Coinbene) => Name("ticker"),
        (C::Ticker, E::KrakenFutures) => Name("ticker_lite"),
        (C::Ticker, E::OkCoin | E::Okex) => Name("spot/ticker"),
        (C::Ticker, E::Exx) => return None,
        (C::Ticker, _) => Unsupported,

        (C::Volume, E::Poloniex) => Id(1003),
        (C::Funding, E::Bitmex) => Name("funding"),
        (C::Funding, E::Bitfinex) => Name("trades"),
        (C::TradesSwap, E::Okex) => Name("swap/trade"),
        (C::TickerSwap, E::Okex) => Name("swap/ticker"),
        (C::L2BookSwap, E::Okex) => Name("swap/depth"),
        (C::Instrument, E::Bitmex) => Name("instrument"),

        _ => return None,
    };
    Some(cell)
}
