//! Minimal concrete analytics collaborator: turns raw ticks into the
//! `AnalyticsSnapshot` schema the decision pipeline consumes and serves it
//! through `SnapshotProvider`. Indicator/zone-detection content beyond this
//! is explicitly out of scope — analytics proper is a black-box
//! collaborator the core only depends on through this interface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::application::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::domain::events::{Event, EventKind, EventPayload};
use crate::domain::ports::SnapshotProvider;
use crate::domain::snapshot::{AnalyticsSnapshot, feature_names};
use crate::infrastructure::event_bus::{EventBus, EventHandler};

#[derive(Default, Clone, Copy)]
struct RollingState {
    last_price: Option<Decimal>,
    order_flow_imbalance: Decimal,
}

/// Reactive component: on each `TradeTickReceived`, refreshes the cached
/// snapshot for (exchange, symbol) and publishes `AnalyticsUpdated`.
pub struct InMemorySnapshotCache {
    bus: EventBus,
    exchange: String,
    state: Arc<ComponentState>,
    snapshots: RwLock<HashMap<String, AnalyticsSnapshot>>,
    rolling: RwLock<HashMap<String, RollingState>>,
}

impl InMemorySnapshotCache {
    pub fn new(bus: EventBus, exchange: impl Into<String>) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            state: Arc::new(ComponentState::new()),
            snapshots: RwLock::new(HashMap::new()),
            rolling: RwLock::new(HashMap::new()),
        }
    }

    /// Directly installs a snapshot, bypassing tick-driven accumulation.
    /// Useful for tests and for seeding a symbol before its first tick.
    pub async fn set_snapshot(&self, snapshot: AnalyticsSnapshot) {
        self.snapshots.write().await.insert(snapshot.symbol.clone(), snapshot);
    }

    async fn on_tick(&self, symbol: &str, price: Decimal, quantity: Decimal) {
        let imbalance = {
            let mut rolling = self.rolling.write().await;
            let entry = rolling.entry(symbol.to_string()).or_default();
            let signed = match entry.last_price {
                Some(last) if price < last => -quantity,
                _ => quantity,
            };
            // Decay the running imbalance so it reflects recent flow, not
            // the full tick history.
            entry.order_flow_imbalance = entry.order_flow_imbalance / Decimal::new(2, 0) + signed;
            entry.last_price = Some(price);
            entry.order_flow_imbalance
        };

        let snapshot = AnalyticsSnapshot::new(self.exchange.clone(), symbol, price)
            .with_feature(feature_names::ORDER_FLOW_IMBALANCE, imbalance);
        self.snapshots.write().await.insert(symbol.to_string(), snapshot);

        self.bus
            .publish(EventPayload::AnalyticsUpdated { exchange: self.exchange.clone(), symbol: symbol.to_string() })
            .await;
    }
}

#[async_trait]
impl SnapshotProvider for InMemorySnapshotCache {
    async fn get_snapshot(&self, exchange: &str, symbol: &str) -> Option<AnalyticsSnapshot> {
        if exchange != self.exchange {
            return None;
        }
        self.snapshots.read().await.get(symbol).cloned()
    }
}

const NAME: &str = "snapshot_cache";

#[async_trait]
impl EventHandler for InMemorySnapshotCache {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        if let EventPayload::TradeTickReceived { symbol, price, quantity } = &event.payload {
            self.state.record_activity();
            self.on_tick(symbol, *price, *quantity).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Component for InMemorySnapshotCache {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        self.state.set_running(true);
        self.bus
            .subscribe(EventKind::TradeTickReceived, self.clone())
            .await;
        Ok(())
    }

    async fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        self.bus.unsubscribe(EventKind::TradeTickReceived, NAME).await;
        self.state.set_running(false);
        Ok(())
    }

    fn health(&self) -> ComponentHealth {
        self.state.health(NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tick_populates_snapshot_with_current_price() {
        let cache = InMemorySnapshotCache::new(EventBus::new(), "binance");
        cache.on_tick("BTC/USDT", Decimal::new(50000, 0), Decimal::new(1, 0)).await;

        let snapshot = cache.get_snapshot("binance", "BTC/USDT").await.unwrap();
        assert_eq!(snapshot.current_price, Decimal::new(50000, 0));
    }

    #[tokio::test]
    async fn wrong_exchange_returns_none() {
        let cache = InMemorySnapshotCache::new(EventBus::new(), "binance");
        cache.on_tick("BTC/USDT", Decimal::new(50000, 0), Decimal::new(1, 0)).await;
        assert!(cache.get_snapshot("mock", "BTC/USDT").await.is_none());
    }

    #[tokio::test]
    async fn falling_price_flips_imbalance_sign_downward() {
        let cache = InMemorySnapshotCache::new(EventBus::new(), "binance");
        cache.on_tick("BTC/USDT", Decimal::new(50000, 0), Decimal::new(10, 0)).await;
        cache.on_tick("BTC/USDT", Decimal::new(49000, 0), Decimal::new(10, 0)).await;

        let snapshot = cache.get_snapshot("binance", "BTC/USDT").await.unwrap();
        let imbalance = snapshot.feature(feature_names::ORDER_FLOW_IMBALANCE).unwrap();
        assert!(imbalance < Decimal::new(10, 0));
    }
}
