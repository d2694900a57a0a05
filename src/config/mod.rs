//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "jairo";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3003;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 10;
const DEFAULT_STORE_PATH: &str = "jairo.db";
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;
const DEFAULT_LIVE_ASSET_DIR: &str = "static";

/// Command-line arguments for the jairo binary.
#[derive(Debug, Parser)]
#[command(name = "jairo", version, about = "Personal homepage server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "JAIRO_CONFIG_FILE", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the counter store file path.
    #[arg(long = "store-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub store_path: Option<PathBuf>,

    /// Override the counter strategy (cached|durable).
    #[arg(long = "stats-strategy", value_name = "STRATEGY")]
    pub stats_strategy: Option<String>,

    /// Override the flush interval for the cached strategy.
    #[arg(long = "stats-flush-interval-seconds", value_name = "SECONDS")]
    pub stats_flush_interval_seconds: Option<u64>,

    /// Toggle the compatibility behavior where a like also decrements visits.
    #[arg(
        long = "stats-like-decrements-visits",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub stats_like_decrements_visits: Option<bool>,

    /// Override the asset source (bundled|live).
    #[arg(long = "assets-source", value_name = "SOURCE")]
    pub assets_source: Option<String>,

    /// Override the directory served in live asset mode.
    #[arg(long = "assets-live-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub assets_live_dir: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub stats: StatsSettings,
    pub assets: AssetSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StatsSettings {
    pub strategy: StatsStrategy,
    pub flush_interval: Duration,
    pub like_decrements_visits: bool,
}

/// How counter durability is traded against request latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsStrategy {
    /// In-memory counters, periodic flush, cached homepage snapshot.
    Cached,
    /// Read-modify-write store transaction on every request.
    Durable,
}

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub source: AssetMode,
    pub live_dir: PathBuf,
}

/// Where `/public/{name}` bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMode {
    /// Compiled-in assets, cached for a year.
    Bundled,
    /// Local filesystem, never cached; for development.
    Live,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("JAIRO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    stats: RawStatsSettings,
    assets: RawAssetSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.store_path.as_ref() {
            self.store.path = Some(path.clone());
        }
        if let Some(strategy) = overrides.stats_strategy.as_ref() {
            self.stats.strategy = Some(strategy.clone());
        }
        if let Some(seconds) = overrides.stats_flush_interval_seconds {
            self.stats.flush_interval_seconds = Some(seconds);
        }
        if let Some(flag) = overrides.stats_like_decrements_visits {
            self.stats.like_decrements_visits = Some(flag);
        }
        if let Some(source) = overrides.assets_source.as_ref() {
            self.assets.source = Some(source.clone());
        }
        if let Some(dir) = overrides.assets_live_dir.as_ref() {
            self.assets.live_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            store,
            stats,
            assets,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            store: build_store_settings(store)?,
            stats: build_stats_settings(stats)?,
            assets: build_asset_settings(assets)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let path = store
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid("store.path", "path must not be empty"));
    }

    Ok(StoreSettings { path })
}

fn build_stats_settings(stats: RawStatsSettings) -> Result<StatsSettings, LoadError> {
    let strategy = match stats.strategy.as_deref() {
        None | Some("cached") => StatsStrategy::Cached,
        Some("durable") => StatsStrategy::Durable,
        Some(other) => {
            return Err(LoadError::invalid(
                "stats.strategy",
                format!("expected `cached` or `durable`, got `{other}`"),
            ));
        }
    };

    let flush_secs = stats
        .flush_interval_seconds
        .unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS);
    if flush_secs == 0 {
        return Err(LoadError::invalid(
            "stats.flush_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(StatsSettings {
        strategy,
        flush_interval: Duration::from_secs(flush_secs),
        like_decrements_visits: stats.like_decrements_visits.unwrap_or(true),
    })
}

fn build_asset_settings(assets: RawAssetSettings) -> Result<AssetSettings, LoadError> {
    let source = match assets.source.as_deref() {
        None | Some("bundled") => AssetMode::Bundled,
        Some("live") => AssetMode::Live,
        Some(other) => {
            return Err(LoadError::invalid(
                "assets.source",
                format!("expected `bundled` or `live`, got `{other}`"),
            ));
        }
    };

    let live_dir = assets
        .live_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LIVE_ASSET_DIR));
    if live_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "assets.live_dir",
            "path must not be empty",
        ));
    }

    Ok(AssetSettings { source, live_dir })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStatsSettings {
    strategy: Option<String>,
    flush_interval_seconds: Option<u64>,
    like_decrements_visits: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAssetSettings {
    source: Option<String>,
    live_dir: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
