use tracing_subscriber::EnvFilter;

/// RUST_LOG wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    // try_init: a second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics() {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], 9000))
        .install()
        .expect("prometheus exporter install");

    tracing::info!("Prometheus exporter listening on http://0.0.0.0:9000/metrics");
    describe();
    metrics::gauge!("lobx_up").set(1.0);
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics() { /* no-op */ }

#[cfg(feature = "metrics-exporter")]
fn describe() {
    metrics::describe_counter!("lobx_messages_total", "Websocket frames handed to a feed");
    metrics::describe_counter!("lobx_book_updates_total", "Book updates emitted to the sink");
    metrics::describe_counter!("lobx_book_desync_total", "Update/delete messages naming an unknown order id");
    metrics::describe_counter!("lobx_reconnects_total", "Reconnect attempts per exchange");
}
