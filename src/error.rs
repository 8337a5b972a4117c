// Crate-wide error type. Registry lookups fail at subscribe time,
// book and decode failures fail the running session.
use thiserror::Error;

use crate::engine::types::Side;
use crate::market_data::normaliser::Exchange;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{pair} is not supported on {exchange}")]
    UnsupportedTradingPair { pair: String, exchange: Exchange },

    #[error("{channel} is not supported on {exchange}")]
    UnsupportedDataFeed { channel: String, exchange: Exchange },

    #[error("trading option {option} is not supported on {exchange}")]
    UnsupportedTradingOption { option: String, exchange: Exchange },

    /// Update/delete named an order id the index has never seen. The book can
    /// no longer be trusted and the session has to start over from a partial.
    #[error("book desync on {pair} {side:?}: unknown order id {order_id}")]
    BookDesync { pair: String, side: Side, order_id: u64 },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("invalid timestamp {raw:?} from {exchange}")]
    InvalidTimestamp { raw: String, exchange: Exchange },

    #[error("{pair} is not active on {exchange}")]
    InactivePair { pair: String, exchange: Exchange },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{exchange}: failed to reconnect after {retries} retries")]
    ExhaustedRetries { exchange: Exchange, retries: u32 },

    #[error("event sink closed")]
    SinkClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FeedError {
    /// Faults raised while resolving a subscription. Reconnecting cannot fix them.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FeedError::UnsupportedTradingPair { .. }
                | FeedError::UnsupportedDataFeed { .. }
                | FeedError::UnsupportedTradingOption { .. }
                | FeedError::InactivePair { .. }
                | FeedError::Config(_)
        )
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_faults() {
        let err = FeedError::UnsupportedDataFeed { channel: "l3_book".into(), exchange: Exchange::Bitmex };
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "l3_book is not supported on BITMEX");

        let desync = FeedError::BookDesync { pair: "XBTUSD".into(), side: Side::Bid, order_id: 7 };
        assert!(!desync.is_configuration());
        assert_eq!(desync.to_string(), "book desync on XBTUSD Bid: unknown order id 7");
    }
}
