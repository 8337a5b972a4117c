// Router drives feeds over websocket connections and forwards their events to the sink.
//
// One task per feed. Inside a task, frames are handled strictly in arrival
// order and the sink is awaited before the next frame is read.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use metrics::counter;
use rust_decimal::Decimal;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::ConnectionSettings;
use crate::error::{FeedError, FeedResult};
use crate::market_data::adapters::{EventSink, Feed};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct FeedHandler {
    feeds: Vec<Box<dyn Feed>>,
    connection: ConnectionSettings,
}

impl FeedHandler {
    pub fn new(connection: ConnectionSettings) -> Self {
        Self { feeds: Vec::new(), connection }
    }

    pub fn add_feed(&mut self, feed: impl Feed + 'static) {
        info!(exchange = %feed.id(), address = feed.address(), "Adding feed");
        self.feeds.push(Box::new(feed));
    }

    /// Run every feed until it fails for good. Each feed gets its own clone of
    /// `sink`. Returns the first feed error once all feeds have stopped.
    pub async fn run<S>(self, sink: S) -> FeedResult<()>
    where
        S: EventSink + Clone + 'static,
    {
        if self.feeds.is_empty() {
            error!("No feeds specified");
            return Err(FeedError::Config("No feeds specified".into()));
        }

        let tasks: Vec<_> = self
            .feeds
            .into_iter()
            .map(|mut feed| {
                let connection = self.connection.clone();
                let mut sink = sink.clone();
                tokio::spawn(async move { run_feed(feed.as_mut(), &connection, &mut sink).await })
            })
            .collect();

        let mut first_err = None;
        for result in futures::future::join_all(tasks).await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(join) => Err(FeedError::Config(format!("feed task panicked: {join}"))),
            };
            if let Err(e) = outcome {
                error!(error = %e, "Feed stopped");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Connect, subscribe and stream one feed, reconnecting with exponential
/// backoff. The retry counter and delay start over after every successful connect.
pub async fn run_feed(feed: &mut dyn Feed, settings: &ConnectionSettings, sink: &mut dyn EventSink) -> FeedResult<()> {
    let exchange = feed.id();
    let address = feed.address().to_string();
    let initial = Duration::from_millis(settings.initial_backoff_ms);
    let max = Duration::from_millis(settings.max_backoff_ms);
    let mut retries: u32 = 0;
    let mut delay = initial;

    loop {
        match tokio_tungstenite::connect_async(address.as_str()).await {
            Ok((ws, _response)) => {
                info!(exchange = %exchange, address = %address, "Connected");
                retries = 0;
                delay = initial;
                match session(feed, ws, settings, sink).await {
                    Ok(()) => warn!(exchange = %exchange, "Connection closed"),
                    Err(e) if e.is_configuration() => return Err(e),
                    // nobody is listening any more
                    Err(FeedError::SinkClosed) => return Err(FeedError::SinkClosed),
                    Err(e) => error!(exchange = %exchange, error = %e, "Session failed"),
                }
            }
            Err(e) => error!(exchange = %exchange, address = %address, error = %e, "Connection failed"),
        }

        if let Some(max_retries) = settings.max_retries() {
            if retries >= max_retries {
                error!(exchange = %exchange, retries, "Giving up on feed");
                return Err(FeedError::ExhaustedRetries { exchange, retries });
            }
        }
        retries += 1;
        counter!("lobx_reconnects_total", "exchange" => exchange.as_str()).increment(1);

        let wait = with_jitter(delay);
        warn!(exchange = %exchange, attempt = retries, backoff_ms = wait.as_millis() as u64, "Reconnecting");
        tokio::time::sleep(wait).await;
        delay = next_delay(delay, max);
    }
}

async fn session(
    feed: &mut dyn Feed,
    ws: WsStream,
    settings: &ConnectionSettings,
    sink: &mut dyn EventSink,
) -> FeedResult<()> {
    let exchange = feed.id();
    let (mut write, mut read) = ws.split();
    write.send(Message::Text(feed.on_subscribe()?)).await?;

    let timeout = (settings.timeout_secs > 0).then(|| Duration::from_secs(settings.timeout_secs));
    let mut watchdog = tokio::time::interval(Duration::from_secs(settings.timeout_interval_secs.max(1)));
    watchdog.tick().await;
    let mut last_message = Instant::now();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_message = Instant::now();
                    feed.on_message(&text, receipt_time(), sink).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(exchange = %exchange, ?frame, "Close frame received");
                    return Ok(());
                }
                Some(Ok(other)) => {
                    last_message = Instant::now();
                    debug!(exchange = %exchange, kind = ?other, "Ignoring non-text frame");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            _ = watchdog.tick(), if timeout.is_some() => {
                let idle = last_message.elapsed();
                if timeout.is_some_and(|t| idle > t) {
                    warn!(exchange = %exchange, idle_secs = idle.as_secs(), "No messages received, closing connection");
                    if let Err(e) = write.close().await {
                        debug!(exchange = %exchange, error = %e, "Close failed");
                    }
                    return Ok(());
                }
            }
        }
    }
}

/// Wall clock receipt time in seconds.
fn receipt_time() -> Decimal {
    Decimal::new(chrono::Utc::now().timestamp_micros(), 6)
}

pub(crate) fn next_delay(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}

/// Adds 0-50% random jitter.
pub(crate) fn with_jitter(delay: Duration) -> Duration {
    let frac = rand::random::<f64>() * 0.5;
    delay + Duration::from_secs_f64(delay.as_secs_f64() * frac)
}
