//! Configuration module.
//!
//! Structured configuration loading from environment variables, organized by
//! domain: Exchange, Analyzer/filter weights, Risk, Notification, and
//! Observability. `Config::from_env()` aggregates every sub-config and
//! validates the result once at startup — a malformed configuration is a
//! fatal-startup error that aborts before the event bus is constructed.

mod analyzer_config;
mod exchange_config;
mod notification_config;
mod observability_config;
mod risk_env_config;

pub use analyzer_config::AnalyzerEnvConfig;
pub use exchange_config::{BinanceConfig, ExchangeEnvConfig};
pub use notification_config::NotificationEnvConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use risk_env_config::RiskEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Which `ExchangeAdapter` the factory should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Binance,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "binance" => Ok(Mode::Binance),
            _ => anyhow::bail!("Invalid MODE: {s}. Must be 'mock' or 'binance'"),
        }
    }
}

/// Process-wide configuration aggregated from every sub-config.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub exchange: ExchangeEnvConfig,
    pub analyzer: AnalyzerEnvConfig,
    pub risk: RiskEnvConfig,
    pub notification: NotificationEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode_str = env::var("MODE").unwrap_or_else(|_| "mock".to_string());
        let mode = Mode::from_str(&mode_str)?;

        let config = Self {
            mode,
            exchange: ExchangeEnvConfig::from_env(),
            analyzer: AnalyzerEnvConfig::from_env().context("failed to load analyzer config")?,
            risk: RiskEnvConfig::from_env().context("failed to load risk config")?,
            notification: NotificationEnvConfig::from_env(),
            observability: ObservabilityEnvConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Runs once at bootstrap. A failure here is fatal-startup: the
    /// process aborts before the event bus is constructed.
    fn validate(&self) -> Result<()> {
        if self.risk.min_position_size_usd > self.risk.max_position_size_usd {
            anyhow::bail!(
                "MIN_POSITION_SIZE_USD ({}) must not exceed MAX_POSITION_SIZE_USD ({})",
                self.risk.min_position_size_usd,
                self.risk.max_position_size_usd
            );
        }
        if self.risk.symbols.is_empty() {
            anyhow::bail!("SYMBOLS must name at least one trading pair");
        }
        if matches!(self.mode, Mode::Binance) && self.exchange.binance.api_key.is_empty() {
            anyhow::bail!("MODE=binance requires BINANCE_API_KEY");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_defaults() {
        let config = Config::from_env().expect("should parse with defaults");
        assert_eq!(config.mode, Mode::Mock);
        assert_eq!(config.risk.max_concurrent_positions, 5);
    }

    #[test]
    fn test_mode_parsing() {
        assert!(matches!(Mode::from_str("mock").unwrap(), Mode::Mock));
        assert!(matches!(Mode::from_str("BINANCE").unwrap(), Mode::Binance));
        assert!(Mode::from_str("alpaca").is_err());
    }
}
