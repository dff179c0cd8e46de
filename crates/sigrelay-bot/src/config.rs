//! Application configuration.
//!
//! Loaded from a TOML file, then overlaid with `SIGRELAY__`-prefixed
//! environment variables (`SIGRELAY__TRADING__CONFIDENCE_THRESHOLD=80`).
//! A missing file is replaced by a commented default before loading.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigrelay_bridge::DevToolsConfig;
use sigrelay_core::{Credentials, TradingPolicy, VenueId};
use sigrelay_signal::LlmConfig;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const ENV_PREFIX: &str = "SIGRELAY";
const ENV_SEPARATOR: &str = "__";

/// Written when the configured file does not exist.
pub const DEFAULT_CONFIG: &str = r#"# sigrelay configuration
# Adjust the values below before disabling read-only mode.

# DevTools endpoint of the desktop client (HTTP base or page ws:// URL)
cdp_url = "http://localhost:9222"

# Message intake: "dom" watches the chat list, "console" reads records an
# in-page observer logs to the console
intake = "dom"

# Analyze and log signals only, never place orders
read_only_mode = true

# Only messages from these channels are analyzed (exact, case-sensitive)
target_channels = ["crypto-signals", "trading-alerts"]

[[exchanges]]
name = "binance"
api_key = ""
api_secret = ""
enabled = false

[[exchanges]]
name = "bybit"
api_key = ""
api_secret = ""
enabled = false

[[exchanges]]
name = "mexc"
api_key = ""
api_secret = ""
enabled = false

[trading]
# Minimum signal confidence (0-100) required to place an order
confidence_threshold = 70
# Per-order cap in USDT
max_trade_amount_usdt = 100.0
# Venues that receive orders
enabled_exchanges = ["binance"]

[llm]
model = "gpt-4o-mini"
api_key = ""
"#;

/// One exchange account.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub enabled: bool,
    /// Override of the venue's public REST endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("has_api_key", &!self.api_key.is_empty())
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Dispatch policy as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Signed so out-of-range values reach validation instead of the parser.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: i64,
    #[serde(default = "default_max_trade_amount")]
    pub max_trade_amount_usdt: Decimal,
    /// Intended notional per order. Defaults to the cap.
    #[serde(default)]
    pub trade_amount_usdt: Option<Decimal>,
    #[serde(default)]
    pub enabled_exchanges: Vec<String>,
}

fn default_confidence_threshold() -> i64 {
    70
}

fn default_max_trade_amount() -> Decimal {
    Decimal::from(100)
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_trade_amount_usdt: default_max_trade_amount(),
            trade_amount_usdt: None,
            enabled_exchanges: Vec::new(),
        }
    }
}

/// Pipeline timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bound on each venue call (order or reconnect).
    #[serde(default = "default_venue_timeout_ms")]
    pub venue_timeout_ms: u64,
    /// How long shutdown waits for in-flight messages before cancelling them.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Interval for publishing connection and bridge gauges.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_venue_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_status_interval_ms() -> u64 {
    10_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            venue_timeout_ms: default_venue_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

/// Where chat messages come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeMode {
    /// Watch the message list through the DevTools DOM domain.
    #[default]
    Dom,
    /// Read bridge records logged to the page console.
    Console,
}

/// DevTools reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevToolsSettings {
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

impl Default for DevToolsSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_cdp_url")]
    pub cdp_url: String,
    #[serde(default)]
    pub intake: IntakeMode,
    #[serde(default = "default_read_only_mode")]
    pub read_only_mode: bool,
    #[serde(default)]
    pub target_channels: Vec<String>,
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub devtools: DevToolsSettings,
}

fn default_cdp_url() -> String {
    "http://localhost:9222".to_string()
}

fn default_read_only_mode() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cdp_url: default_cdp_url(),
            intake: IntakeMode::default(),
            read_only_mode: default_read_only_mode(),
            target_channels: Vec::new(),
            exchanges: Vec::new(),
            trading: TradingConfig::default(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            devtools: DevToolsSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load, overlay the environment, and validate.
    ///
    /// Writes [`DEFAULT_CONFIG`] first when `path` does not exist.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, writing defaults");
            Self::generate_default(path)?;
        }

        let config = Self::from_file(path)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(AppError::Validation(errors))
        }
    }

    /// Parse a file with the environment overlay, without validating.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("target_channels")
                    .with_list_parse_key("trading.enabled_exchanges"),
            )
            .build()?;

        settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Write the commented default file, creating parent directories.
    pub fn generate_default(path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Every problem in the configuration; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (i, exchange) in self.exchanges.iter().enumerate() {
            if VenueId::from_str(&exchange.name).is_err() {
                errors.push(format!(
                    "exchanges[{i}].name must be one of binance, bybit, mexc (got '{}')",
                    exchange.name
                ));
            }
            if exchange.enabled && exchange.api_key.trim().is_empty() {
                errors.push(format!(
                    "exchanges[{i}].api_key must not be empty when enabled ({})",
                    exchange.name
                ));
            }
        }

        for name in &self.trading.enabled_exchanges {
            if VenueId::from_str(name).is_err() {
                errors.push(format!("trading.enabled_exchanges contains unknown venue '{name}'"));
            }
        }

        if !(0..=100).contains(&self.trading.confidence_threshold) {
            errors.push(format!(
                "trading.confidence_threshold must be within 0-100 (got {})",
                self.trading.confidence_threshold
            ));
        }
        if self.trading.max_trade_amount_usdt <= Decimal::ZERO {
            errors.push(format!(
                "trading.max_trade_amount_usdt must be positive (got {})",
                self.trading.max_trade_amount_usdt
            ));
        }
        if let Some(amount) = self.trading.trade_amount_usdt {
            if amount <= Decimal::ZERO {
                errors.push(format!("trading.trade_amount_usdt must be positive (got {amount})"));
            }
        }

        if !self.llm.is_configured() {
            errors.push("llm.api_key must not be empty".to_string());
        }

        errors
    }

    /// Dispatch policy built from the `trading` table.
    pub fn policy(&self) -> AppResult<TradingPolicy> {
        let threshold = u8::try_from(self.trading.confidence_threshold).map_err(|_| {
            AppError::Config(format!(
                "confidence_threshold out of range: {}",
                self.trading.confidence_threshold
            ))
        })?;
        let venues = self
            .trading
            .enabled_exchanges
            .iter()
            .map(|name| VenueId::from_str(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TradingPolicy::new(
            threshold,
            self.trading.max_trade_amount_usdt,
            self.trading.trade_amount_usdt,
            venues,
        )?)
    }

    /// Accounts with `enabled = true`.
    pub fn venue_accounts(&self) -> AppResult<Vec<(VenueId, Credentials, Option<String>)>> {
        self.exchanges
            .iter()
            .filter(|e| e.enabled)
            .map(|e| -> AppResult<(VenueId, Credentials, Option<String>)> {
                Ok((
                    VenueId::from_str(&e.name)?,
                    Credentials::new(e.api_key.clone(), e.api_secret.clone()),
                    e.base_url.clone(),
                ))
            })
            .collect()
    }

    /// Connection settings shared by both intake modes.
    pub fn devtools_config(&self) -> DevToolsConfig {
        DevToolsConfig {
            endpoint: self.cdp_url.clone(),
            max_reconnect_attempts: self.devtools.max_reconnect_attempts,
            reconnect_base_delay_ms: self.devtools.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.devtools.reconnect_max_delay_ms,
            connect_timeout_ms: self.devtools.connect_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sigrelay-config-{}-{name}", std::process::id()))
            .join("config.toml")
    }

    fn write(name: &str, body: &str) -> PathBuf {
        let path = temp_path(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = "sk-test".to_string();
        config
    }

    #[test]
    fn test_default_file_parses_and_only_lacks_llm_key() {
        let path = write("defaults", DEFAULT_CONFIG);
        let config = AppConfig::from_file(&path).unwrap();

        assert!(config.read_only_mode);
        assert_eq!(config.intake, IntakeMode::Dom);
        assert_eq!(config.cdp_url, "http://localhost:9222");
        assert_eq!(config.target_channels, vec!["crypto-signals", "trading-alerts"]);
        assert_eq!(config.exchanges.len(), 3);
        assert_eq!(config.trading.confidence_threshold, 70);
        assert_eq!(config.trading.max_trade_amount_usdt, dec!(100));
        assert_eq!(config.llm.model, "gpt-4o-mini");

        assert_eq!(config.validate(), vec!["llm.api_key must not be empty".to_string()]);
    }

    #[test]
    fn test_missing_file_is_generated_then_validated() {
        let path = temp_path("generated");
        let _ = std::fs::remove_file(&path);

        let result = AppConfig::load(&path);
        assert!(path.exists());
        assert!(matches!(result, Err(AppError::Validation(ref e)) if e.len() == 1));
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = AppConfig::default();
        config.exchanges = vec![
            ExchangeConfig {
                name: "kraken".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                enabled: false,
                base_url: None,
            },
            ExchangeConfig {
                name: "bybit".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                enabled: true,
                base_url: None,
            },
        ];
        config.trading.confidence_threshold = 101;
        config.trading.max_trade_amount_usdt = dec!(0);
        config.trading.trade_amount_usdt = Some(dec!(-5));
        config.trading.enabled_exchanges = vec!["ftx".to_string()];

        let errors = config.validate();
        assert_eq!(errors.len(), 7, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("exchanges[0].name")));
        assert!(errors.iter().any(|e| e.contains("exchanges[1].api_key")));
        assert!(errors.iter().any(|e| e.contains("'ftx'")));
        assert!(errors.iter().any(|e| e.contains("confidence_threshold")));
        assert!(errors.iter().any(|e| e.contains("max_trade_amount_usdt")));
        assert!(errors.iter().any(|e| e.contains("trade_amount_usdt must be positive (got -5)")));
        assert!(errors.iter().any(|e| e.contains("llm.api_key")));
    }

    #[test]
    fn test_negative_threshold_is_reported_not_rejected_by_parser() {
        let path = write(
            "negative",
            "[trading]\nconfidence_threshold = -1\nmax_trade_amount_usdt = 50\n[llm]\napi_key = \"k\"\n",
        );
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.validate().len(), 1);
        assert!(config.policy().is_err());
    }

    #[test]
    fn test_exchange_names_are_case_insensitive() {
        let mut config = valid();
        config.exchanges = vec![ExchangeConfig {
            name: "Binance".to_string(),
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            enabled: true,
            base_url: None,
        }];
        config.trading.enabled_exchanges = vec!["BINANCE".to_string()];
        assert!(config.validate().is_empty());

        let accounts = config.venue_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].0, VenueId::Binance);
        assert!(config.policy().unwrap().is_enabled(VenueId::Binance));
    }

    #[test]
    fn test_policy_uses_trade_amount_when_set() {
        let mut config = valid();
        config.trading.max_trade_amount_usdt = dec!(200);
        assert_eq!(config.policy().unwrap().intended_notional(), dec!(200));

        config.trading.trade_amount_usdt = Some(dec!(25));
        assert_eq!(config.policy().unwrap().intended_notional(), dec!(25));
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = write("env", "[llm]\napi_key = \"k\"\n");
        std::env::set_var("SIGRELAY__PIPELINE__VENUE_TIMEOUT_MS", "2500");
        let config = AppConfig::from_file(&path).unwrap();
        std::env::remove_var("SIGRELAY__PIPELINE__VENUE_TIMEOUT_MS");

        assert_eq!(config.pipeline.venue_timeout_ms, 2500);
        assert_eq!(config.pipeline.shutdown_grace_ms, 5000);
    }

    #[test]
    fn test_debug_hides_exchange_secrets() {
        let exchange = ExchangeConfig {
            name: "mexc".to_string(),
            api_key: "visible-key".to_string(),
            api_secret: "hidden-secret".to_string(),
            enabled: true,
            base_url: None,
        };
        let out = format!("{exchange:?}");
        assert!(!out.contains("hidden-secret"));
        assert!(!out.contains("visible-key"));
    }

    #[test]
    fn test_devtools_config_mapping() {
        let mut config = valid();
        config.cdp_url = "ws://127.0.0.1:9222/devtools/page/1".to_string();
        config.devtools.max_reconnect_attempts = 3;
        let devtools = config.devtools_config();
        assert_eq!(devtools.endpoint, config.cdp_url);
        assert_eq!(devtools.max_reconnect_attempts, 3);
        assert_eq!(devtools.reconnect_max_delay_ms, 60_000);
    }

    #[test]
    fn test_intake_mode_parses() {
        let path = write("intake", "intake = \"console\"\n[llm]\napi_key = \"k\"\n");
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.intake, IntakeMode::Console);
        assert_eq!(AppConfig::default().intake, IntakeMode::Dom);

        let path = write("intake-bad", "intake = \"screen\"\n");
        assert!(AppConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&valid()).unwrap();
        assert!(toml_str.contains("read_only_mode = true"));
        assert!(toml_str.contains("[trading]"));
    }
}
