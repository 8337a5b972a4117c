use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};

use lobx_feed::config::{AppConfig, Cli};
use lobx_feed::market_data::adapters::bitmex::{BitmexFeed, BitmexRest};
use lobx_feed::market_data::adapters::MarketEvent;
use lobx_feed::market_data::normaliser::{Exchange, Registry};
use lobx_feed::market_data::router::FeedHandler;
use lobx_feed::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let cfg = AppConfig::from_cli(&cli)?;
    telemetry::init_tracing(&cfg.log_filter);
    telemetry::init_metrics();

    let mut registry = Registry::new();
    registry.load(Exchange::Bitmex);
    let registry = Arc::new(registry);

    let rest = BitmexRest::new(cfg.feed.rest_url.clone());
    let feed = BitmexFeed::from_source(Arc::clone(&registry), &cfg.feed, &rest).await?;

    let mut handler = FeedHandler::new(cfg.connection.clone());
    handler.add_feed(feed);

    let (tx, mut rx) = mpsc::channel::<MarketEvent>(10_000);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                MarketEvent::Book { update, .. } => {
                    info!(
                        pair = %update.pair,
                        forced = update.forced,
                        bids = update.delta.bid.len(),
                        asks = update.delta.ask.len(),
                        ts = %update.timestamp,
                        "book"
                    );
                }
                MarketEvent::Trade(t) => {
                    info!(pair = %t.pair, side = ?t.side, amount = %t.amount, price = %t.price, ts = %t.timestamp, "trade");
                }
                MarketEvent::Funding(f) => {
                    info!(pair = %f.pair, rate = %f.rate, rate_daily = %f.rate_daily, ts = %f.timestamp, "funding");
                }
                MarketEvent::Instrument(i) => {
                    debug!(pair = %i.pair, fields = i.fields.len(), ts = %i.timestamp, "instrument");
                }
            }
        }
    });

    tokio::select! {
        res = handler.run(tx) => res?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    printer.abort();
    Ok(())
}
