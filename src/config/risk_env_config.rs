//! Execution risk configuration parsing from environment variables.
//!
//! Handles position sizing bounds, retry/backoff parameters, the connection
//! pool size, and per-pair storage retention windows.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::env;

#[derive(Debug, Clone)]
pub struct RiskEnvConfig {
    pub max_concurrent_positions: usize,
    pub min_position_size_usd: Decimal,
    pub max_position_size_usd: Decimal,
    pub default_position_size_pct: Decimal,
    pub max_position_size_pct: Decimal,
    pub min_risk_reward_ratio: Decimal,
    pub max_stop_loss_distance_pct: Decimal,

    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,

    pub connection_pool_size: usize,
    pub tick_retention_hours: i64,
    pub candle_retention_days: i64,

    pub symbols: Vec<String>,
}

impl RiskEnvConfig {
    pub fn from_env() -> Result<Self> {
        let symbols_str = env::var("SYMBOLS").unwrap_or_else(|_| "BTC/USDT,ETH/USDT".to_string());
        let symbols: Vec<String> = symbols_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            max_concurrent_positions: Self::parse_usize("MAX_CONCURRENT_POSITIONS", 5)?,
            min_position_size_usd: Self::parse_decimal("MIN_POSITION_SIZE_USD", "10")?,
            max_position_size_usd: Self::parse_decimal("MAX_POSITION_SIZE_USD", "5000")?,
            default_position_size_pct: Self::parse_decimal("DEFAULT_POSITION_SIZE_PCT", "2")?,
            max_position_size_pct: Self::parse_decimal("MAX_POSITION_SIZE_PCT", "10")?,
            min_risk_reward_ratio: Self::parse_decimal("MIN_RISK_REWARD_RATIO", "1.5")?,
            max_stop_loss_distance_pct: Self::parse_decimal("MAX_STOP_LOSS_DISTANCE_PCT", "5")?,

            max_retries: Self::parse_u32("MAX_RETRIES", 3)?,
            retry_backoff_base_ms: Self::parse_u64("RETRY_BACKOFF_BASE_MS", 500)?,
            retry_backoff_max_ms: Self::parse_u64("RETRY_BACKOFF_MAX_MS", 8000)?,

            connection_pool_size: Self::parse_usize("CONNECTION_POOL_SIZE", 10)?,
            tick_retention_hours: Self::parse_i64("TICK_RETENTION_HOURS", 24)?,
            candle_retention_days: Self::parse_i64("CANDLE_RETENTION_DAYS", 30)?,

            symbols,
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {key}"))
    }

    fn parse_u32(key: &str, default: u32) -> Result<u32> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u32>()
            .context(format!("Failed to parse {key}"))
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u64>()
            .context(format!("Failed to parse {key}"))
    }

    fn parse_i64(key: &str, default: i64) -> Result<i64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<i64>()
            .context(format!("Failed to parse {key}"))
    }

    fn parse_decimal(key: &str, default: &str) -> Result<Decimal> {
        let raw = env::var(key).unwrap_or_else(|_| default.to_string());
        Decimal::from_str_exact_or_f64(&raw).context(format!("Failed to parse {key}"))
    }
}

trait DecimalParse: Sized {
    fn from_str_exact_or_f64(s: &str) -> Option<Self>;
}

impl DecimalParse for Decimal {
    fn from_str_exact_or_f64(s: &str) -> Option<Self> {
        s.parse::<Decimal>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(Decimal::from_f64))
    }
}
