//! Exchange Factory: caches at most one adapter instance per
//! (name, market-type, testnet?) triple, connecting lazily on first
//! acquisition. Grounded on
//! `original_source/src/execution/exchanges/exchange_factory.py`'s
//! `{name}_{market_type}_{testnet|mainnet}` cache key.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::domain::errors::ExchangeError;
use crate::domain::ports::{BalanceProvider, ExchangeAdapter};
use crate::infrastructure::exchange::binance::BinanceAdapter;
use crate::infrastructure::exchange::mock::MockExchangeAdapter;
use crate::infrastructure::observability::Metrics;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    market_type: String,
    testnet: bool,
}

impl CacheKey {
    fn label(&self) -> String {
        format!("{}_{}_{}", self.name, self.market_type, if self.testnet { "testnet" } else { "mainnet" })
    }
}

pub struct ExchangeFactory {
    config: Config,
    cache: Mutex<HashMap<CacheKey, Arc<dyn ExchangeAdapter>>>,
    metrics: Option<Metrics>,
}

impl ExchangeFactory {
    pub fn new(config: Config) -> Self {
        Self { config, cache: Mutex::new(HashMap::new()), metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the cached adapter for this (name, market-type, testnet) triple,
    /// connecting it lazily the first time it's requested.
    pub async fn acquire(
        &self,
        name: &str,
        market_type: &str,
        testnet: bool,
    ) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError> {
        let key = CacheKey { name: name.to_string(), market_type: market_type.to_string(), testnet };

        let mut cache = self.cache.lock().await;
        if let Some(adapter) = cache.get(&key) {
            return Ok(adapter.clone());
        }

        let adapter: Arc<dyn ExchangeAdapter> = match name {
            "mock" => {
                let mut adapter = MockExchangeAdapter::new();
                if let Some(metrics) = &self.metrics {
                    adapter = adapter.with_metrics(metrics.clone());
                }
                Arc::new(adapter)
            }
            "binance" => {
                let binance_config = &self.config.exchange.binance;
                if binance_config.api_key.is_empty() {
                    return Err(ExchangeError::Exchange("BINANCE_API_KEY not configured".into()));
                }
                let mut adapter = BinanceAdapter::new(
                    binance_config.api_key.clone(),
                    binance_config.secret_key.clone(),
                    binance_config.base_url.clone(),
                );
                if let Some(metrics) = &self.metrics {
                    adapter = adapter.with_metrics(metrics.clone());
                }
                Arc::new(adapter)
            }
            other => return Err(ExchangeError::Exchange(format!("unknown exchange adapter: {other}"))),
        };

        adapter.connect().await?;
        info!(exchange = %key.label(), "exchange adapter connected");
        cache.insert(key, adapter.clone());
        Ok(adapter)
    }

    /// Disconnects and drops every cached adapter. Called once at shutdown.
    pub async fn disconnect_all(&self) {
        let mut cache = self.cache.lock().await;
        for (key, adapter) in cache.drain() {
            if let Err(err) = adapter.disconnect().await {
                tracing::warn!(exchange = %key.label(), error = %err, "error disconnecting exchange adapter");
            }
        }
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Queries account balance through the (always spot, mainnet) cached adapter
/// for the named exchange. Injected into the risk-sizing handler.
#[async_trait]
impl BalanceProvider for ExchangeFactory {
    async fn get_balance(&self, exchange: &str, asset: &str) -> anyhow::Result<Decimal> {
        let adapter = self.acquire(exchange, "spot", false).await?;
        let balances = adapter.get_balance(Some(asset)).await?;
        Ok(balances.get(asset).map(|b| b.free).unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        Config::from_env().expect("default config should parse")
    }

    #[tokio::test]
    async fn repeated_acquire_returns_same_cached_instance() {
        let factory = ExchangeFactory::new(test_config());
        let a = factory.acquire("mock", "spot", false).await.unwrap();
        let b = factory.acquire("mock", "spot", false).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.cached_count().await, 1);
    }

    #[tokio::test]
    async fn distinct_market_type_gets_a_distinct_instance() {
        let factory = ExchangeFactory::new(test_config());
        let spot = factory.acquire("mock", "spot", false).await.unwrap();
        let margin = factory.acquire("mock", "margin", false).await.unwrap();
        assert!(!Arc::ptr_eq(&spot, &margin));
        assert_eq!(factory.cached_count().await, 2);
    }

    #[tokio::test]
    async fn unknown_adapter_name_errors() {
        let factory = ExchangeFactory::new(test_config());
        let result = factory.acquire("coinbase", "spot", false).await;
        assert!(result.is_err());
    }
}
