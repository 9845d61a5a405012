//! `StorageSink` implementation backed by the per-pair `ConnectionPool`.
//! Grounded on `infrastructure/persistence/database.rs`'s schema
//! conventions (TEXT-encoded decimals, `sqlx::query` with bound params).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::instrument;

use crate::domain::errors::StorageError;
use crate::domain::storage::{CandleRecord, FeatureRecord, StorageSink, TickRecord};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::storage::connection_pool::{ConnectionPool, PairKey};

pub struct SqliteStorageSink {
    pool: Arc<ConnectionPool>,
    retention_hours: i64,
    retention_days: i64,
}

impl SqliteStorageSink {
    pub fn new(data_dir: PathBuf, capacity: usize, retention_hours: i64, retention_days: i64) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(data_dir, capacity)),
            retention_hours,
            retention_days,
        }
    }

    /// Attaches metrics to the underlying connection pool. Must be called
    /// immediately after `new()`, before the sink is shared behind an `Arc`
    /// or cloned elsewhere, since it requires unique ownership of the pool.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        match Arc::try_unwrap(self.pool) {
            Ok(pool) => self.pool = Arc::new(pool.with_metrics(metrics)),
            Err(pool) => self.pool = pool,
        }
        self
    }

    pub fn connection_pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

#[async_trait]
impl StorageSink for SqliteStorageSink {
    #[instrument(skip(self, record), fields(exchange = %record.exchange, symbol = %record.symbol))]
    async fn append_tick(&self, record: TickRecord) -> Result<(), StorageError> {
        let key = PairKey::new(&record.exchange, &record.symbol);
        let conn = self.pool.acquire(&key).await.map_err(|e| StorageError::NotFound(e.to_string()))?;

        sqlx::query("INSERT INTO ticks (timestamp, price, quantity) VALUES (?, ?, ?)")
            .bind(record.timestamp.timestamp())
            .bind(record.price.to_string())
            .bind(record.quantity.to_string())
            .execute(&conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(exchange = %record.exchange, symbol = %record.symbol))]
    async fn append_candle(&self, record: CandleRecord) -> Result<(), StorageError> {
        let key = PairKey::new(&record.exchange, &record.symbol);
        let conn = self.pool.acquire(&key).await.map_err(|e| StorageError::NotFound(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO candles \
             (resolution_minutes, open_time, open, high, low, close, volume) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.resolution_minutes)
        .bind(record.open_time.timestamp())
        .bind(record.open.to_string())
        .bind(record.high.to_string())
        .bind(record.low.to_string())
        .bind(record.close.to_string())
        .bind(record.volume.to_string())
        .execute(&conn)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(exchange = %record.exchange, symbol = %record.symbol))]
    async fn append_feature(&self, record: FeatureRecord) -> Result<(), StorageError> {
        let key = PairKey::new(&record.exchange, &record.symbol);
        let conn = self.pool.acquire(&key).await.map_err(|e| StorageError::NotFound(e.to_string()))?;

        sqlx::query("INSERT INTO features (timestamp, name, value) VALUES (?, ?, ?)")
            .bind(record.timestamp.timestamp())
            .bind(&record.name)
            .bind(record.value.to_string())
            .execute(&conn)
            .await?;
        Ok(())
    }

    async fn query_recent_candles(
        &self,
        exchange: &str,
        symbol: &str,
        resolution_minutes: u32,
        limit: u32,
    ) -> Result<Vec<CandleRecord>, StorageError> {
        let key = PairKey::new(exchange, symbol);
        let conn = self.pool.acquire(&key).await.map_err(|e| StorageError::NotFound(e.to_string()))?;

        let rows: Vec<(i64, String, String, String, String, String)> = sqlx::query_as(
            "SELECT open_time, open, high, low, close, volume FROM candles \
             WHERE resolution_minutes = ? ORDER BY open_time DESC LIMIT ?",
        )
        .bind(resolution_minutes)
        .bind(limit)
        .fetch_all(&conn)
        .await?;

        let records = rows
            .into_iter()
            .map(|(open_time, open, high, low, close, volume)| CandleRecord {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                resolution_minutes,
                open_time: timestamp_to_utc(open_time),
                open: parse_decimal(&open),
                high: parse_decimal(&high),
                low: parse_decimal(&low),
                close: parse_decimal(&close),
                volume: parse_decimal(&volume),
            })
            .collect();
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn retention_sweep(&self, exchange: &str, symbol: &str) -> Result<u64, StorageError> {
        let key = PairKey::new(exchange, symbol);
        let conn = self.pool.acquire(&key).await.map_err(|e| StorageError::NotFound(e.to_string()))?;

        let tick_cutoff = Utc::now().timestamp() - self.retention_hours * 3600;
        let candle_cutoff = Utc::now().timestamp() - self.retention_days * 86400;

        let tick_result = sqlx::query("DELETE FROM ticks WHERE timestamp < ?")
            .bind(tick_cutoff)
            .execute(&conn)
            .await?;
        let candle_result = sqlx::query("DELETE FROM candles WHERE open_time < ?")
            .bind(candle_cutoff)
            .execute(&conn)
            .await?;
        let feature_result = sqlx::query("DELETE FROM features WHERE timestamp < ?")
            .bind(tick_cutoff)
            .execute(&conn)
            .await?;

        Ok(tick_result.rows_affected() + candle_result.rows_affected() + feature_result.rows_affected())
    }
}

fn timestamp_to_utc(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

fn parse_decimal(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sink() -> SqliteStorageSink {
        let mut dir = std::env::temp_dir();
        dir.push(format!("rustrade-sink-test-{}", uuid::Uuid::new_v4()));
        SqliteStorageSink::new(dir, 200, 72, 30)
    }

    #[tokio::test]
    async fn append_and_query_candle_round_trips() {
        let sink = sink();
        sink.append_candle(CandleRecord {
            exchange: "mock".into(),
            symbol: "BTC/USDT".into(),
            resolution_minutes: 1,
            open_time: Utc::now(),
            open: Decimal::new(50000, 0),
            high: Decimal::new(50100, 0),
            low: Decimal::new(49900, 0),
            close: Decimal::new(50050, 0),
            volume: Decimal::new(10, 0),
        })
        .await
        .unwrap();

        let candles = sink.query_recent_candles("mock", "BTC/USDT", 1, 10).await.unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, Decimal::new(50050, 0));
    }

    #[tokio::test]
    async fn retention_sweep_deletes_stale_rows() {
        let sink = sink();
        sink.append_tick(TickRecord {
            exchange: "mock".into(),
            symbol: "BTC/USDT".into(),
            timestamp: Utc::now() - chrono::Duration::hours(200),
            price: Decimal::new(50000, 0),
            quantity: Decimal::new(1, 0),
        })
        .await
        .unwrap();

        let deleted = sink.retention_sweep("mock", "BTC/USDT").await.unwrap();
        assert_eq!(deleted, 1);
    }
}
