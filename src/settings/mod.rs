// Layered configuration: built-in defaults, optional TOML file, then BOT__* env vars
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::Credentials;
use crate::error::ConfigError;
use crate::oracle::llm::{DEFAULT_API_URL, DEFAULT_MODEL};
use crate::risk::RiskParams;

/// Candle intervals the spot OHLC endpoint accepts, in minutes
const SUPPORTED_INTERVALS: &[u32] = &[1, 5, 15, 30, 60, 240, 1440, 10080, 21600];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub futures_base_url: String,
    pub spot_base_url: String,
    /// Futures contract orders are placed on
    pub trading_symbol: String,
    /// Spot pair whose candles drive indicators and reference prices
    pub pricing_symbol: String,
    pub candle_interval_minutes: u32,
    pub tick_size: f64,
    /// When false, order submission and cancellation are simulated
    pub live_trading: bool,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            futures_base_url: "https://futures.kraken.com".to_string(),
            spot_base_url: "https://api.kraken.com".to_string(),
            trading_symbol: "PF_XBTUSD".to_string(),
            pricing_symbol: "XBTUSD".to_string(),
            candle_interval_minutes: 5,
            tick_size: 0.5,
            live_trading: false,
            request_timeout_secs: 10,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    pub memory_path: PathBuf,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            memory_path: PathBuf::from("trade_memory.json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeSettings,
    pub risk: RiskParams,
    pub oracle: OracleSettings,
    pub cycle: CycleSettings,
}

impl AppConfig {
    /// Load settings from `path` (if given and present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix("BOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    #[cfg(test)]
    fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    key,
                    reason: format!("must be positive, got {}", value),
                })
            }
        }

        positive("risk.leverage", self.risk.leverage)?;
        positive("risk.risk_percent", self.risk.risk_percent)?;
        positive("risk.stop_loss_percent", self.risk.stop_loss_percent)?;
        positive("risk.minimum_notional_usd", self.risk.minimum_notional_usd)?;
        positive("exchange.tick_size", self.exchange.tick_size)?;
        positive("risk.leverage_safety_factor", self.risk.leverage_safety_factor)?;

        if self.risk.leverage_safety_factor > 1.0 {
            return Err(ConfigError::Invalid {
                key: "risk.leverage_safety_factor",
                reason: "must not exceed 1.0".to_string(),
            });
        }
        if self.risk.stop_loss_percent >= 100.0 {
            return Err(ConfigError::Invalid {
                key: "risk.stop_loss_percent",
                reason: "must be below 100".to_string(),
            });
        }
        if !SUPPORTED_INTERVALS.contains(&self.exchange.candle_interval_minutes) {
            return Err(ConfigError::Invalid {
                key: "exchange.candle_interval_minutes",
                reason: format!("must be one of {:?}", SUPPORTED_INTERVALS),
            });
        }
        if self.exchange.trading_symbol.trim().is_empty() {
            return Err(ConfigError::Missing("exchange.trading_symbol"));
        }
        if self.exchange.pricing_symbol.trim().is_empty() {
            return Err(ConfigError::Missing("exchange.pricing_symbol"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "oracle.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Exchange API key pair from `KRAKEN_API_KEY` / `KRAKEN_API_SECRET`
pub fn credentials_from_env() -> Result<Credentials, ConfigError> {
    Ok(Credentials::new(
        required_env("KRAKEN_API_KEY")?,
        required_env("KRAKEN_API_SECRET")?,
    ))
}

/// Oracle API key from `OPENAI_API_KEY`
pub fn oracle_key_from_env() -> Result<String, ConfigError> {
    required_env("OPENAI_API_KEY")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!config.exchange.live_trading);
        assert_eq!(config.risk, RiskParams::default());
    }

    #[test]
    fn test_toml_overrides() {
        let config = AppConfig::from_toml(
            r#"
            [exchange]
            trading_symbol = "PF_ETHUSD"
            pricing_symbol = "ETHUSD"
            live_trading = true
            candle_interval_minutes = 15

            [risk]
            leverage = 5.0
            risk_percent = 0.5

            [cycle]
            memory_path = "/var/lib/bot/memory.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.exchange.trading_symbol, "PF_ETHUSD");
        assert!(config.exchange.live_trading);
        assert_eq!(config.exchange.candle_interval_minutes, 15);
        assert_eq!(config.exchange.tick_size, 0.5);
        assert_eq!(config.risk.leverage, 5.0);
        assert_eq!(config.risk.stop_loss_percent, 2.0);
        assert_eq!(config.cycle.memory_path, PathBuf::from("/var/lib/bot/memory.json"));
    }

    #[test]
    fn test_rejects_bad_safety_factor() {
        let result = AppConfig::from_toml("[risk]\nleverage_safety_factor = 1.5\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                key: "risk.leverage_safety_factor",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_unsupported_interval() {
        let result = AppConfig::from_toml("[exchange]\ncandle_interval_minutes = 7\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_stop_loss() {
        let result = AppConfig::from_toml("[risk]\nstop_loss_percent = 0.0\n");
        assert!(result.is_err());
    }
}
