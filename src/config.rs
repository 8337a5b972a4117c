// Layered configuration for the feed binary.
//
// Sources, lowest priority first:
// 1. compiled-in defaults (BitMEX production endpoints, `XBTUSD` book + trades)
// 2. an optional TOML file
// 3. `LOBX_*` environment variables, nested with `__` (e.g. `LOBX_CONNECTION__RETRIES=-1`)
// 4. command line flags

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::engine::types::PartialPolicy;
use crate::error::{FeedError, FeedResult};
use crate::market_data::adapters::bitmex;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "lobx-feed")]
#[command(about = "Streams a normalized BitMEX order book, trades, funding and instruments")]
pub struct Cli {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pair to subscribe (repeatable), replaces the configured pairs
    #[arg(short, long = "pair")]
    pub pairs: Vec<String>,

    /// Canonical channel to subscribe (repeatable), e.g. l2_book
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// tracing filter used when RUST_LOG is unset
    #[arg(long)]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub feed: FeedSettings,
    pub connection: ConnectionSettings,
    pub log_filter: String,
}

/// What one feed subscribes to. Pairs and channels are canonical; the feed
/// translates them through the registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedSettings {
    #[serde(default)]
    pub pairs: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// channel -> pairs; when non-empty it replaces `pairs` x `channels`
    #[serde(default)]
    pub per_channel: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub partial_policy: PartialPolicy,
    pub ws_url: String,
    pub rest_url: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            channels: Vec::new(),
            per_channel: BTreeMap::new(),
            partial_policy: PartialPolicy::default(),
            ws_url: bitmex::WS_URL.to_string(),
            rest_url: bitmex::REST_URL.to_string(),
        }
    }
}

impl FeedSettings {
    pub fn validate(&self) -> FeedResult<()> {
        if !self.per_channel.is_empty() {
            if self.per_channel.values().all(Vec::is_empty) {
                return Err(FeedError::Config("per_channel lists no pairs".into()));
            }
            return Ok(());
        }
        if self.pairs.is_empty() {
            return Err(FeedError::Config("no pairs configured".into()));
        }
        if self.channels.is_empty() {
            return Err(FeedError::Config("no channels configured".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionSettings {
    /// Reconnect attempts before giving up, -1 retries forever.
    pub retries: i64,
    /// Seconds without a message before the connection is considered dead, 0 disables.
    pub timeout_secs: u64,
    pub timeout_interval_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self { retries: 10, timeout_secs: 120, timeout_interval_secs: 30, initial_backoff_ms: 1_000, max_backoff_ms: 30_000 }
    }
}

impl ConnectionSettings {
    /// `None` when retries are unlimited.
    pub fn max_retries(&self) -> Option<u32> {
        u32::try_from(self.retries).ok()
    }
}

impl AppConfig {
    /// Defaults, then the file at `path`, then `LOBX_*` env vars.
    pub fn load(path: Option<&PathBuf>) -> FeedResult<Self> {
        let mut builder = defaults()?;
        if let Some(path) = path {
            let path = path.to_str().ok_or_else(|| FeedError::Config("config path is not valid UTF-8".into()))?;
            builder = builder.add_source(File::with_name(path).required(true));
        }
        // prefix_separator has to be set, otherwise config uses "__" after the prefix as well
        builder = builder.add_source(
            Environment::with_prefix("LOBX")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("feed.pairs")
                .with_list_parse_key("feed.channels")
                .try_parsing(true),
        );
        build(builder)
    }

    /// Load from the sources named on the command line and apply its overrides.
    pub fn from_cli(cli: &Cli) -> FeedResult<Self> {
        let mut cfg = Self::load(cli.config.as_ref())?;
        cfg.apply_cli(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if !cli.pairs.is_empty() {
            self.feed.pairs = cli.pairs.clone();
            self.feed.per_channel.clear();
        }
        if !cli.channels.is_empty() {
            self.feed.channels = cli.channels.clone();
            self.feed.per_channel.clear();
        }
        if let Some(filter) = &cli.log_filter {
            self.log_filter = filter.clone();
        }
    }

    pub fn validate(&self) -> FeedResult<()> {
        self.feed.validate()?;
        let conn = &self.connection;
        if conn.retries < -1 {
            return Err(FeedError::Config(format!("retries must be -1 or more, got {}", conn.retries)));
        }
        if conn.timeout_secs > 0 && conn.timeout_interval_secs == 0 {
            return Err(FeedError::Config("timeout_interval_secs must be positive".into()));
        }
        if conn.initial_backoff_ms > conn.max_backoff_ms {
            return Err(FeedError::Config("initial_backoff_ms exceeds max_backoff_ms".into()));
        }
        Ok(())
    }
}

fn defaults() -> FeedResult<ConfigBuilder<config::builder::DefaultState>> {
    let conn = ConnectionSettings::default();
    let builder = Config::builder()
        .set_default("log_filter", "info")?
        .set_default("feed.pairs", vec!["XBTUSD"])?
        .set_default("feed.channels", vec!["l2_book", "trades"])?
        .set_default("feed.partial_policy", "session")?
        .set_default("feed.ws_url", bitmex::WS_URL)?
        .set_default("feed.rest_url", bitmex::REST_URL)?
        .set_default("connection.retries", conn.retries)?
        .set_default("connection.timeout_secs", conn.timeout_secs)?
        .set_default("connection.timeout_interval_secs", conn.timeout_interval_secs)?
        .set_default("connection.initial_backoff_ms", conn.initial_backoff_ms)?
        .set_default("connection.max_backoff_ms", conn.max_backoff_ms)?;
    Ok(builder)
}

fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> FeedResult<AppConfig> {
    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

impl From<config::ConfigError> for FeedError {
    fn from(err: config::ConfigError) -> Self {
        FeedError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> AppConfig {
        let builder = defaults().unwrap().add_source(File::from_str(toml, FileFormat::Toml));
        build(builder).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = build(defaults().unwrap()).unwrap();
        assert_eq!(cfg.feed.pairs, vec!["XBTUSD"]);
        assert_eq!(cfg.feed.channels, vec!["l2_book", "trades"]);
        assert_eq!(cfg.feed.partial_policy, PartialPolicy::Session);
        assert_eq!(cfg.feed.ws_url, bitmex::WS_URL);
        assert_eq!(cfg.connection, ConnectionSettings::default());
        assert_eq!(cfg.log_filter, "info");
        cfg.validate().unwrap();
    }

    #[test]
    fn test_file_overrides_defaults() {
        let cfg = from_toml(
            r#"
            log_filter = "debug"

            [feed]
            partial_policy = "per_pair"

            [feed.per_channel]
            l2_book = ["XBTUSD", "ETHUSD"]
            funding = ["XBTUSD"]

            [connection]
            retries = -1
            "#,
        );
        assert_eq!(cfg.log_filter, "debug");
        assert_eq!(cfg.feed.partial_policy, PartialPolicy::PerPair);
        assert_eq!(cfg.feed.per_channel["l2_book"], vec!["XBTUSD", "ETHUSD"]);
        assert_eq!(cfg.connection.max_retries(), None);
        assert_eq!(cfg.connection.timeout_secs, 120);
    }

    #[test]
    fn test_cli_overrides() {
        let mut cfg = from_toml("[feed.per_channel]\nl2_book = [\"ETHUSD\"]\n");
        let cli = Cli::parse_from(["lobx-feed", "--pair", "XBTUSD", "--pair", "ETHUSD", "--log-filter", "trace"]);
        cfg.apply_cli(&cli);
        assert_eq!(cfg.feed.pairs, vec!["XBTUSD", "ETHUSD"]);
        assert!(cfg.feed.per_channel.is_empty());
        assert_eq!(cfg.log_filter, "trace");
    }

    #[test]
    fn test_validation() {
        let mut cfg = build(defaults().unwrap()).unwrap();
        cfg.feed.pairs.clear();
        assert!(matches!(cfg.validate(), Err(FeedError::Config(_))));

        let mut cfg = build(defaults().unwrap()).unwrap();
        cfg.connection.retries = -2;
        assert!(cfg.validate().unwrap_err().is_configuration());

        let mut cfg = build(defaults().unwrap()).unwrap();
        cfg.connection.initial_backoff_ms = 60_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_max_retries() {
        let conn = ConnectionSettings { retries: 3, ..ConnectionSettings::default() };
        assert_eq!(conn.max_retries(), Some(3));
    }
}
