use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const TESTNET_BASE_URL: &str = "https://testnet.binance.vision";
const LIVE_BASE_URL: &str = "https://api.binance.com";

/// Application configuration
///
/// Layered: `config/default.toml` -> `config/local.toml` -> `DCABOT__*` env vars.
/// Purchase settings are not part of this; they live in the settings store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub exchange: ExchangeConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL. When unset the bot runs against the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub testnet: bool,
    /// Overrides the testnet/live base URL
    pub base_url: Option<String>,
    pub pair: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Smallest order notional the exchange accepts, in quote currency
    pub min_notional: f64,
    pub recv_window_ms: u64,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            testnet: true,
            base_url: None,
            pair: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            min_notional: 10.0,
            recv_window_ms: 5000,
            requests_per_minute: 600,
            timeout_secs: 10,
        }
    }
}

impl ExchangeConfig {
    pub fn endpoint(&self) -> &str {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/'),
            None if self.testnet => TESTNET_BASE_URL,
            None => LIVE_BASE_URL,
        }
    }
}

/// What a tick does when the stored settings are incomplete
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnconfiguredTickPolicy {
    /// Return without writing any history record
    #[default]
    Skip,
    /// Append a failed attempt saying the bot is not configured
    RecordFailure,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub unconfigured_tick: UnconfiguredTickPolicy,
    pub status_log_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unconfigured_tick: UnconfiguredTickPolicy::Skip,
            status_log_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "dcabot=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from config files and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("DCABOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
