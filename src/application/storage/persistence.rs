//! Reactive component bridging the event bus to the storage contract:
//! persists ticks, completed candles and analytics features as they're
//! published, and periodically sweeps retention on every pair it has seen.
//! Grounded on `notifications/router.rs`'s subscribe-many-kinds-plus-
//! background-poll-loop shape.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::application::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::domain::events::{Event, EventKind, EventPayload};
use crate::domain::ports::SnapshotProvider;
use crate::domain::storage::{CandleRecord, FeatureRecord, StorageSink, TickRecord};
use crate::infrastructure::event_bus::{EventBus, EventHandler};

const SWEEP_POLL_INTERVAL: Duration = Duration::from_secs(3600);

const PERSISTED_KINDS: &[EventKind] =
    &[EventKind::TradeTickReceived, EventKind::CandleCompleted, EventKind::AnalyticsUpdated];

const NAME: &str = "storage_persistence";

pub struct StoragePersistence {
    bus: EventBus,
    exchange: String,
    storage: Arc<dyn StorageSink>,
    snapshots: Arc<dyn SnapshotProvider>,
    state: Arc<ComponentState>,
    seen_symbols: RwLock<HashSet<String>>,
    background: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StoragePersistence {
    pub fn new(
        bus: EventBus,
        exchange: impl Into<String>,
        storage: Arc<dyn StorageSink>,
        snapshots: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            storage,
            snapshots,
            state: Arc::new(ComponentState::new()),
            seen_symbols: RwLock::new(HashSet::new()),
            background: Mutex::new(None),
        }
    }

    async fn track_symbol(&self, symbol: &str) {
        self.seen_symbols.write().await.insert(symbol.to_string());
    }

    async fn on_tick(&self, symbol: &str, price: rust_decimal::Decimal, quantity: rust_decimal::Decimal) {
        self.track_symbol(symbol).await;
        let record = TickRecord {
            exchange: self.exchange.clone(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            price,
            quantity,
        };
        if let Err(err) = self.storage.append_tick(record).await {
            warn!(symbol, error = %err, "failed to persist tick");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_candle(
        &self,
        symbol: &str,
        resolution_minutes: u32,
        open: rust_decimal::Decimal,
        high: rust_decimal::Decimal,
        low: rust_decimal::Decimal,
        close: rust_decimal::Decimal,
        volume: rust_decimal::Decimal,
    ) {
        self.track_symbol(symbol).await;
        let record = CandleRecord {
            exchange: self.exchange.clone(),
            symbol: symbol.to_string(),
            resolution_minutes,
            open_time: Utc::now(),
            open,
            high,
            low,
            close,
            volume,
        };
        if let Err(err) = self.storage.append_candle(record).await {
            warn!(symbol, error = %err, "failed to persist candle");
        }
    }

    async fn on_analytics_updated(&self, exchange: &str, symbol: &str) {
        if exchange != self.exchange {
            return;
        }
        self.track_symbol(symbol).await;
        let Some(snapshot) = self.snapshots.get_snapshot(exchange, symbol).await else {
            return;
        };
        let timestamp = Utc::now();
        for (name, value) in snapshot.features {
            let record = FeatureRecord {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                timestamp,
                name,
                value,
            };
            if let Err(err) = self.storage.append_feature(record).await {
                warn!(symbol, error = %err, "failed to persist feature");
            }
        }
    }

    async fn sweep_all(&self) {
        let symbols: Vec<String> = self.seen_symbols.read().await.iter().cloned().collect();
        for symbol in symbols {
            match self.storage.retention_sweep(&self.exchange, &symbol).await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(symbol, deleted, "retention sweep removed stale rows");
                }
                Ok(_) => {}
                Err(err) => warn!(symbol, error = %err, "retention sweep failed"),
            }
        }
    }
}

#[async_trait]
impl EventHandler for StoragePersistence {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.state.record_activity();
        match &event.payload {
            EventPayload::TradeTickReceived { symbol, price, quantity } => {
                self.on_tick(symbol, *price, *quantity).await;
            }
            EventPayload::CandleCompleted { symbol, resolution_minutes, open, high, low, close, volume } => {
                self.on_candle(symbol, *resolution_minutes, *open, *high, *low, *close, *volume).await;
            }
            EventPayload::AnalyticsUpdated { exchange, symbol } => {
                self.on_analytics_updated(exchange, symbol).await;
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Component for StoragePersistence {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        self.state.set_running(true);
        for kind in PERSISTED_KINDS {
            self.bus.subscribe(*kind, self.clone()).await;
        }

        let sweep_handle = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                if !sweep_handle.state.is_running() {
                    break;
                }
                sweep_handle.sweep_all().await;
                tokio::time::sleep(SWEEP_POLL_INTERVAL).await;
            }
        });
        *self.background.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        for kind in PERSISTED_KINDS {
            self.bus.unsubscribe(*kind, NAME).await;
        }
        self.state.set_running(false);
        if let Some(handle) = self.background.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }

    fn health(&self) -> ComponentHealth {
        self.state.health(NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::AnalyticsSnapshot;
    use rust_decimal::Decimal;

    struct StubSnapshots(AnalyticsSnapshot);

    #[async_trait]
    impl SnapshotProvider for StubSnapshots {
        async fn get_snapshot(&self, _exchange: &str, _symbol: &str) -> Option<AnalyticsSnapshot> {
            Some(self.0.clone())
        }
    }

    fn sink() -> Arc<dyn StorageSink> {
        let mut dir = std::env::temp_dir();
        dir.push(format!("rustrade-persistence-test-{}", uuid::Uuid::new_v4()));
        Arc::new(crate::infrastructure::storage::SqliteStorageSink::new(dir, 50, 72, 30))
    }

    #[tokio::test]
    async fn tick_event_persists_and_tracks_symbol() {
        let storage = sink();
        let snapshots: Arc<dyn SnapshotProvider> =
            Arc::new(StubSnapshots(AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(100, 0))));
        let persistence = StoragePersistence::new(EventBus::new(), "binance", storage.clone(), snapshots);

        let event = Event {
            sequence: 0,
            timestamp: Utc::now(),
            payload: EventPayload::TradeTickReceived {
                symbol: "BTC/USDT".into(),
                price: Decimal::new(100, 0),
                quantity: Decimal::new(1, 0),
            },
        };
        persistence.handle(&event).await.unwrap();

        assert!(persistence.seen_symbols.read().await.contains("BTC/USDT"));
        let candles = storage.query_recent_candles("binance", "BTC/USDT", 1, 10).await.unwrap();
        assert!(candles.is_empty());
    }

    #[tokio::test]
    async fn analytics_updated_persists_every_feature() {
        let storage = sink();
        let snapshot = AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(100, 0))
            .with_feature("order_flow_imbalance", Decimal::new(3, 0));
        let snapshots: Arc<dyn SnapshotProvider> = Arc::new(StubSnapshots(snapshot));
        let persistence = StoragePersistence::new(EventBus::new(), "binance", storage, snapshots);

        let event = Event {
            sequence: 0,
            timestamp: Utc::now(),
            payload: EventPayload::AnalyticsUpdated { exchange: "binance".into(), symbol: "BTC/USDT".into() },
        };
        persistence.handle(&event).await.unwrap();

        assert!(persistence.seen_symbols.read().await.contains("BTC/USDT"));
    }
}
