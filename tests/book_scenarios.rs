// End-to-end scenarios: raw BitMEX frames in, normalized events out of an mpsc sink.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use lobx_feed::config::{ConnectionSettings, FeedSettings};
use lobx_feed::engine::book::BookEngine;
use lobx_feed::engine::types::{BookAction, BookEntry, BookMessage, PartialPolicy, PriceLevel, Side};
use lobx_feed::market_data::adapters::bitmex::BitmexFeed;
use lobx_feed::market_data::adapters::{Feed, MarketEvent};
use lobx_feed::market_data::normaliser::{CanonicalChannel, Exchange, RawTimestamp, Registry};
use lobx_feed::market_data::router::FeedHandler;
use lobx_feed::FeedError;

const PARTIAL: &str = r#"{"table":"orderBookL2","action":"partial","keys":["symbol","id","side"],"data":[{"symbol":"XBTUSD","id":1,"side":"Buy","size":5,"price":100}]}"#;
const UPDATE: &str = r#"{"table":"orderBookL2","action":"update","data":[{"symbol":"XBTUSD","id":1,"side":"Buy","size":3}]}"#;
const DELETE: &str = r#"{"table":"orderBookL2","action":"delete","data":[{"symbol":"XBTUSD","id":1,"side":"Buy"}]}"#;

fn d(v: i64) -> Decimal {
    Decimal::from(v)
}

fn bitmex_feed(pairs: &[&str], channels: &[&str], policy: PartialPolicy) -> BitmexFeed {
    let settings = FeedSettings {
        pairs: pairs.iter().map(|s| s.to_string()).collect(),
        channels: channels.iter().map(|s| s.to_string()).collect(),
        partial_policy: policy,
        ..FeedSettings::default()
    };
    let active = vec!["XBTUSD".to_string(), "ETHUSD".to_string()];
    BitmexFeed::new(Arc::new(Registry::new()), &settings, &active).unwrap()
}

fn drain(rx: &mut mpsc::Receiver<MarketEvent>) -> Vec<MarketEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn book_updates(events: &[MarketEvent]) -> Vec<(bool, Vec<PriceLevel>, Vec<PriceLevel>)> {
    events
        .iter()
        .map(|e| match e {
            MarketEvent::Book { update, .. } => (update.forced, update.delta.bid.clone(), update.delta.ask.clone()),
            other => panic!("unexpected event {other:?}"),
        })
        .collect()
}

#[tokio::test]
async fn partial_then_update_then_delete() {
    let mut feed = bitmex_feed(&["XBTUSD"], &["l2_book"], PartialPolicy::Session);
    let (mut tx, mut rx) = mpsc::channel::<MarketEvent>(64);
    feed.on_subscribe().unwrap();

    feed.on_message(PARTIAL, d(1), &mut tx).await.unwrap();
    feed.on_message(UPDATE, d(2), &mut tx).await.unwrap();

    let bids = &feed.engine().book("XBTUSD").unwrap().bids;
    assert_eq!(bids.iter().map(|(p, s)| (*p, *s)).collect::<Vec<_>>(), vec![(d(100), d(3))]);

    let events = drain(&mut rx);
    assert_eq!(
        book_updates(&events),
        vec![
            (true, vec![PriceLevel::new(d(100), d(5))], vec![]),
            (false, vec![PriceLevel::new(d(100), d(3))], vec![]),
        ]
    );
    match &events[1] {
        MarketEvent::Book { feed, update } => {
            assert_eq!(*feed, Exchange::Bitmex);
            assert_eq!(update.pair, "XBTUSD");
            assert_eq!(update.channel, CanonicalChannel::L2Book);
            assert_eq!(update.timestamp, d(2));
        }
        other => panic!("unexpected event {other:?}"),
    }

    feed.on_message(DELETE, d(3), &mut tx).await.unwrap();
    assert!(feed.engine().book("XBTUSD").unwrap().bids.is_empty());
    assert!(feed.engine().order_ids("XBTUSD").unwrap().is_empty());
    assert_eq!(book_updates(&drain(&mut rx)), vec![(false, vec![PriceLevel::new(d(100), Decimal::ZERO)], vec![])]);
}

#[tokio::test]
async fn deltas_before_partial_are_ignored() {
    let mut feed = bitmex_feed(&["XBTUSD"], &["l2_book"], PartialPolicy::Session);
    let (mut tx, mut rx) = mpsc::channel::<MarketEvent>(64);
    feed.on_subscribe().unwrap();

    feed.on_message(UPDATE, d(1), &mut tx).await.unwrap();
    feed.on_message(DELETE, d(1), &mut tx).await.unwrap();

    assert!(drain(&mut rx).is_empty());
    assert!(feed.engine().book("XBTUSD").unwrap().is_empty());
    assert!(!feed.engine().partial_received());
}

#[tokio::test]
async fn unknown_action_emits_nothing() {
    let mut feed = bitmex_feed(&["XBTUSD"], &["l2_book"], PartialPolicy::Session);
    let (mut tx, mut rx) = mpsc::channel::<MarketEvent>(64);
    feed.on_message(PARTIAL, d(1), &mut tx).await.unwrap();
    drain(&mut rx);

    let replace = r#"{"table":"orderBookL2","action":"replace","data":[{"whatever":true}]}"#;
    feed.on_message(replace, d(2), &mut tx).await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn desync_leaves_book_untouched() {
    let mut feed = bitmex_feed(&["XBTUSD"], &["l2_book"], PartialPolicy::Session);
    let (mut tx, mut rx) = mpsc::channel::<MarketEvent>(64);
    feed.on_message(PARTIAL, d(1), &mut tx).await.unwrap();
    drain(&mut rx);
    let before = feed.engine().clone();

    // id 1 is known, id 9 is not: neither may be applied
    let update = r#"{"table":"orderBookL2","action":"update","data":[{"symbol":"XBTUSD","id":1,"side":"Buy","size":1},{"symbol":"XBTUSD","id":9,"side":"Buy","size":1}]}"#;
    let err = feed.on_message(update, d(2), &mut tx).await.unwrap_err();
    assert!(matches!(err, FeedError::BookDesync { order_id: 9, side: Side::Bid, .. }));

    assert_eq!(feed.engine().books, before.books);
    assert_eq!(feed.engine().id_index, before.id_index);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn per_pair_policy_waits_for_each_partial() {
    let mut feed = bitmex_feed(&["XBTUSD", "ETHUSD"], &["l2_book"], PartialPolicy::PerPair);
    let (mut tx, mut rx) = mpsc::channel::<MarketEvent>(64);
    feed.on_subscribe().unwrap();
    feed.on_message(PARTIAL, d(1), &mut tx).await.unwrap();

    let eth_insert = r#"{"table":"orderBookL2","action":"insert","data":[{"symbol":"ETHUSD","id":5,"side":"Sell","size":2,"price":2000}]}"#;
    feed.on_message(eth_insert, d(2), &mut tx).await.unwrap();
    assert!(feed.engine().book("ETHUSD").unwrap().is_empty());

    let eth_partial = r#"{"table":"orderBookL2","action":"partial","data":[{"symbol":"ETHUSD","id":5,"side":"Sell","size":2,"price":2000}]}"#;
    feed.on_message(eth_partial, d(3), &mut tx).await.unwrap();

    let forced: Vec<(String, bool)> = drain(&mut rx)
        .into_iter()
        .map(|e| match e {
            MarketEvent::Book { update, .. } => (update.pair, update.forced),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(forced, vec![("XBTUSD".to_string(), true), ("ETHUSD".to_string(), true)]);
}

#[test]
fn engine_emits_one_update_per_pair() {
    let mut engine = BookEngine::new(["XBTUSD", "ETHUSD"], PartialPolicy::Session);
    let entry = |pair: &str, id: u64, price: i64| BookEntry {
        pair: pair.to_string(),
        side: Side::Ask,
        order_id: id,
        price: Some(d(price)),
        size: Some(d(1)),
    };
    let msg = BookMessage {
        action: BookAction::Partial,
        entries: vec![entry("ETHUSD", 1, 2000), entry("XBTUSD", 2, 9000), entry("ETHUSD", 3, 2001)],
    };
    let updates = engine.apply(&msg, d(1)).unwrap();
    let pairs: Vec<_> = updates.iter().map(|u| (u.pair.as_str(), u.delta.ask.len())).collect();
    assert_eq!(pairs, vec![("ETHUSD", 2), ("XBTUSD", 1)]);
    assert!(engine.is_consistent());
}

#[test]
fn registry_round_trips_builtin_universe() {
    let exchanges: Vec<Exchange> = Exchange::ALL.iter().copied().filter(|e| !e.has_dynamic_pairs()).collect();
    let registry = Registry::with_exchanges(&exchanges);
    for exchange in exchanges {
        for (pair, native) in lobx_feed::market_data::normaliser::pairs::builtin_pairs(exchange) {
            assert_eq!(registry.pair_to_exchange(&pair, exchange).unwrap(), native);
            assert_eq!(registry.pair_to_canonical(&native).as_deref(), Some(pair.as_str()), "{exchange} {native}");
        }
    }
}

#[test]
fn registry_timestamps_and_unsupported_channels() {
    let registry = Registry::new();
    let ms = registry.normalize_timestamp(Exchange::Binance, &RawTimestamp::from(1_500_000_000_123)).unwrap();
    assert_eq!(ms, Decimal::from_str("1500000000.123").unwrap());
    let us = registry.normalize_timestamp(Exchange::Bitstamp, &RawTimestamp::from(1_500_000_000_123_456)).unwrap();
    assert_eq!(us, Decimal::from_str("1500000000.123456").unwrap());

    let err = registry.channel_to_exchange(Exchange::Bitmex, "l3_book").unwrap_err();
    assert!(matches!(err, FeedError::UnsupportedDataFeed { .. }));
}

// A local websocket server plays BitMEX for one connection, then goes away.
#[tokio::test]
async fn handler_streams_then_exhausts_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // refuse the reconnect
        drop(listener);
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let subscribe = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected subscribe, got {other:?}"),
        };
        ws.send(Message::Text(r#"{"info":"Welcome to the BitMEX Realtime API."}"#.into())).await.unwrap();
        ws.send(Message::Text(PARTIAL.into())).await.unwrap();
        ws.send(Message::Text(UPDATE.into())).await.unwrap();
        ws.close(None).await.unwrap();
        subscribe
    });

    let settings = FeedSettings {
        pairs: vec!["XBTUSD".into()],
        channels: vec!["l2_book".into()],
        ws_url: format!("ws://{addr}"),
        ..FeedSettings::default()
    };
    let feed = BitmexFeed::new(Arc::new(Registry::new()), &settings, &["XBTUSD".to_string()]).unwrap();
    let connection = ConnectionSettings {
        retries: 1,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        ..ConnectionSettings::default()
    };
    let mut handler = FeedHandler::new(connection);
    handler.add_feed(feed);

    let (tx, mut rx) = mpsc::channel::<MarketEvent>(64);
    let err = tokio::time::timeout(Duration::from_secs(10), handler.run(tx)).await.unwrap().unwrap_err();
    assert!(matches!(err, FeedError::ExhaustedRetries { exchange: Exchange::Bitmex, retries: 1 }));

    let subscribe: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(subscribe, serde_json::json!({"op": "subscribe", "args": ["orderBookL2:XBTUSD"]}));
    assert_eq!(book_updates(&drain(&mut rx)).len(), 2);
}
