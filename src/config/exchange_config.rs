//! Exchange configuration parsing from environment variables.
//!
//! Handles credentials and endpoints for the supported exchange adapters:
//! a deterministic mock (paper trading / backtests) and Binance spot.

use std::env;

/// Binance API configuration.
#[derive(Debug, Clone, Default)]
pub struct BinanceConfig {
    pub api_key: String,
    pub secret_key: String,
    pub base_url: String,
    pub ws_url: String,
}

impl BinanceConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("BINANCE_API_KEY").unwrap_or_default(),
            secret_key: env::var("BINANCE_SECRET_KEY").unwrap_or_default(),
            base_url: env::var("BINANCE_BASE_URL")
                .unwrap_or_else(|_| "https://api.binance.com".to_string()),
            ws_url: env::var("BINANCE_WS_URL")
                .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string()),
        }
    }
}

/// Aggregated exchange configuration.
#[derive(Debug, Clone, Default)]
pub struct ExchangeEnvConfig {
    pub binance: BinanceConfig,
}

impl ExchangeEnvConfig {
    pub fn from_env() -> Self {
        Self {
            binance: BinanceConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_config_defaults() {
        let config = BinanceConfig::from_env();
        assert!(config.base_url.contains("binance.com"));
    }
}
