//! Bounds the number of simultaneously open per-pair SQLite stores and
//! evicts least-recently-used when full. Grounded on
//! `original_source/src/market_data/storage/connection_pool.py`: acquire and
//! release both move the touched entry to the most-recently-used end;
//! eviction only happens on a miss when the pool is already at capacity.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::infrastructure::observability::Metrics;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub exchange: String,
    pub symbol: String,
}

impl PairKey {
    pub fn new(exchange: &str, symbol: &str) -> Self {
        Self { exchange: exchange.to_string(), symbol: symbol.to_string() }
    }

    fn file_name(&self) -> String {
        let safe_symbol = self.symbol.replace('/', "_");
        format!("{}_{}.sqlite", self.exchange, safe_symbol)
    }
}

struct Inner {
    pools: HashMap<PairKey, SqlitePool>,
    order: VecDeque<PairKey>,
}

/// LRU-bounded pool of per-pair SQLite connection pools.
pub struct ConnectionPool {
    data_dir: PathBuf,
    capacity: usize,
    inner: Mutex<Inner>,
    metrics: Option<Metrics>,
}

impl ConnectionPool {
    pub fn new(data_dir: PathBuf, capacity: usize) -> Self {
        Self {
            data_dir,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner { pools: HashMap::new(), order: VecDeque::new() }),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the pool for this pair, opening and caching it if it isn't
    /// already resident, evicting the least-recently-touched pair first.
    #[instrument(skip(self), fields(exchange = %key.exchange, symbol = %key.symbol))]
    pub async fn acquire(&self, key: &PairKey) -> Result<SqlitePool> {
        let mut inner = self.inner.lock().await;

        if let Some(pool) = inner.pools.get(key).cloned() {
            touch(&mut inner.order, key);
            if let Some(metrics) = &self.metrics {
                metrics.record_pool_acquire(true);
            }
            return Ok(pool);
        }

        if inner.pools.len() >= self.capacity
            && let Some(evicted) = inner.order.pop_front()
        {
            inner.pools.remove(&evicted);
            debug!(exchange = %evicted.exchange, symbol = %evicted.symbol, "evicted LRU connection pool entry");
        }

        tokio::fs::create_dir_all(&self.data_dir).await.context("creating storage data directory")?;
        let path = self.data_dir.join(key.file_name());
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening sqlite store for {}/{}", key.exchange, key.symbol))?;

        init_schema(&pool).await?;
        info!(exchange = %key.exchange, symbol = %key.symbol, "opened per-pair connection pool");

        inner.pools.insert(key.clone(), pool.clone());
        touch(&mut inner.order, key);
        if let Some(metrics) = &self.metrics {
            metrics.record_pool_acquire(false);
        }
        Ok(pool)
    }

    pub async fn release(&self, key: &PairKey) {
        let mut inner = self.inner.lock().await;
        if inner.pools.contains_key(key) {
            touch(&mut inner.order, key);
        }
    }

    pub async fn resident_count(&self) -> usize {
        self.inner.lock().await.pools.len()
    }
}

fn touch(order: &mut VecDeque<PairKey>, key: &PairKey) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
    order.push_back(key.clone());
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ticks (
            timestamp INTEGER NOT NULL,
            price TEXT NOT NULL,
            quantity TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("creating ticks table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candles (
            resolution_minutes INTEGER NOT NULL,
            open_time INTEGER NOT NULL,
            open TEXT NOT NULL,
            high TEXT NOT NULL,
            low TEXT NOT NULL,
            close TEXT NOT NULL,
            volume TEXT NOT NULL,
            PRIMARY KEY (resolution_minutes, open_time)
        );
        "#,
    )
    .execute(pool)
    .await
    .context("creating candles table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS features (
            timestamp INTEGER NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("creating features table")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquiring_same_key_reuses_resident_pool() {
        let dir = tempdir();
        let pool = ConnectionPool::new(dir, 200);
        let key = PairKey::new("mock", "BTC/USDT");
        let a = pool.acquire(&key).await.unwrap();
        let b = pool.acquire(&key).await.unwrap();
        assert!(a.size() > 0);
        assert_eq!(pool.resident_count().await, 1);
        drop(b);
    }

    #[tokio::test]
    async fn capacity_of_one_evicts_previous_pair() {
        let dir = tempdir();
        let pool = ConnectionPool::new(dir, 1);
        let a = PairKey::new("mock", "BTC/USDT");
        let b = PairKey::new("mock", "ETH/USDT");
        pool.acquire(&a).await.unwrap();
        pool.acquire(&b).await.unwrap();
        assert_eq!(pool.resident_count().await, 1);
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("rustrade-pool-test-{}", uuid::Uuid::new_v4()));
        dir
    }
}
