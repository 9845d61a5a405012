use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::StorageError;

#[derive(Debug, Clone)]
pub struct TickRecord {
    pub exchange: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone)]
pub struct CandleRecord {
    pub exchange: String,
    pub symbol: String,
    pub resolution_minutes: u32,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub exchange: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: Decimal,
}

/// Per-pair storage contract: every exchange/symbol pair owns its own
/// connection and table set, accessed through a bounded connection pool.
/// Grounded on `original_source/src/market_data/storage/` and the
/// sqlx-backed persistence layer it mirrors.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn append_tick(&self, record: TickRecord) -> Result<(), StorageError>;
    async fn append_candle(&self, record: CandleRecord) -> Result<(), StorageError>;
    async fn append_feature(&self, record: FeatureRecord) -> Result<(), StorageError>;

    async fn query_recent_candles(
        &self,
        exchange: &str,
        symbol: &str,
        resolution_minutes: u32,
        limit: u32,
    ) -> Result<Vec<CandleRecord>, StorageError>;

    /// Deletes rows older than the configured retention window for a pair;
    /// run periodically by the storage maintenance loop.
    async fn retention_sweep(&self, exchange: &str, symbol: &str) -> Result<u64, StorageError>;
}
