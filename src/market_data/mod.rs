// Market data module entrypoint
pub mod adapters;       // exchange feeds (BitMEX), normalized events, sink/source traits
pub mod normaliser;     // canonical <-> exchange pairs, channels, options, timestamps
pub mod external_book;  // in-memory price levels for one pair
pub mod router;         // connection supervisor driving the feeds
