use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::domain::trading::order::{ManagedOrder, OrderState};
use crate::domain::trading::types::{OrderSide, OrderType};
use crate::infrastructure::observability::Metrics;

/// Number of independent `active` shards. Orders for different client ids
/// land in different shards (via a hash of the client order id), so
/// `update_*` calls for unrelated orders don't contend on the same lock.
const SHARD_COUNT: usize = 16;

/// Authoritative store of order lifecycle state, keyed by client order id.
/// `active` is sharded so concurrent `update_*` calls for distinct client
/// ids don't serialize behind a single table-wide lock. Grounded on
/// `execution/order_manager.py`'s `OrderManager`.
pub struct OrderManager {
    max_history_size: usize,
    active: Vec<RwLock<HashMap<String, ManagedOrder>>>,
    history: RwLock<VecDeque<ManagedOrder>>,
    exchange_index: RwLock<HashMap<String, String>>,
    active_count: AtomicI64,
    metrics: Option<Metrics>,
}

fn shard_index(client_order_id: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    client_order_id.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

#[derive(Debug, Clone, Copy)]
pub struct OrderManagerStats {
    pub active_orders: usize,
    pub history_size: usize,
    pub total_orders: usize,
}

impl OrderManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            max_history_size,
            active: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            history: RwLock::new(VecDeque::new()),
            exchange_index: RwLock::new(HashMap::new()),
            active_count: AtomicI64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn shard(&self, client_order_id: &str) -> &RwLock<HashMap<String, ManagedOrder>> {
        &self.active[shard_index(client_order_id)]
    }

    fn record_transition(&self, state: OrderState) {
        if let Some(metrics) = &self.metrics {
            let label = match state {
                OrderState::Filled => "filled",
                OrderState::Cancelled => "cancelled",
                OrderState::Rejected => "rejected",
                OrderState::Failed => "failed",
                OrderState::Pending | OrderState::Submitted | OrderState::Active | OrderState::PartiallyFilled => {
                    return;
                }
            };
            metrics.record_order_transition(label);
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, client_order_id, symbol, price, exchange, market_type, signal_id))]
    pub async fn create_order(
        &self,
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        exchange: impl Into<String>,
        market_type: impl Into<String>,
        signal_id: Option<String>,
    ) -> ManagedOrder {
        let client_order_id = client_order_id.into();
        let order = ManagedOrder::new(
            client_order_id.clone(),
            symbol.into(),
            side,
            order_type,
            quantity,
            price,
            exchange.into(),
            market_type.into(),
            signal_id,
        );

        info!(
            client_order_id = %client_order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %quantity,
            "created order"
        );

        self.shard(&client_order_id).write().await.insert(client_order_id, order.clone());
        let count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(metrics) = &self.metrics {
            metrics.set_order_manager_active("active", count as f64);
        }
        order
    }

    #[instrument(skip(self, exchange_order_id))]
    pub async fn update_submitted(
        &self,
        client_order_id: &str,
        exchange_order_id: impl Into<String>,
    ) -> Option<ManagedOrder> {
        let exchange_order_id = exchange_order_id.into();
        let mut active = self.shard(client_order_id).write().await;
        let order = match active.get_mut(client_order_id) {
            Some(order) => order,
            None => {
                warn!(client_order_id, "order not found");
                return None;
            }
        };

        order.exchange_order_id = Some(exchange_order_id.clone());
        order.state = OrderState::Submitted;
        order.submitted_at = Some(Utc::now());

        self.exchange_index
            .write()
            .await
            .insert(exchange_order_id.clone(), client_order_id.to_string());

        info!(client_order_id, exchange_order_id = %exchange_order_id, "order submitted");
        Some(order.clone())
    }

    #[instrument(skip(self, commission_asset))]
    pub async fn update_filled(
        &self,
        client_order_id: &str,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
        commission: Decimal,
        commission_asset: impl Into<String>,
        is_partial: bool,
    ) -> Option<ManagedOrder> {
        let mut active = self.shard(client_order_id).write().await;
        let order = match active.get_mut(client_order_id) {
            Some(order) => order,
            None => {
                warn!(client_order_id, "order not found");
                return None;
            }
        };

        order.filled_quantity = filled_quantity;
        order.avg_fill_price = Some(avg_fill_price);
        order.commission = commission;
        order.commission_asset = commission_asset.into();

        if is_partial {
            order.state = OrderState::PartiallyFilled;
            info!(
                client_order_id,
                filled = %filled_quantity,
                requested = %order.quantity,
                price = %avg_fill_price,
                "order partially filled"
            );
            let result = order.clone();
            drop(active);
            return Some(result);
        }

        order.state = OrderState::Filled;
        order.filled_at = Some(Utc::now());
        info!(client_order_id, filled = %filled_quantity, price = %avg_fill_price, "order filled");

        let completed = active.remove(client_order_id).unwrap();
        drop(active);
        self.move_to_history(completed.clone()).await;
        Some(completed)
    }

    #[instrument(skip(self, error))]
    pub async fn update_failed(
        &self,
        client_order_id: &str,
        error: impl Into<String>,
        is_rejected: bool,
    ) -> Option<ManagedOrder> {
        let mut active = self.shard(client_order_id).write().await;
        if !active.contains_key(client_order_id) {
            warn!(client_order_id, "order not found");
            return None;
        }

        let order = active.get_mut(client_order_id).unwrap();
        order.state = if is_rejected {
            OrderState::Rejected
        } else {
            OrderState::Failed
        };
        order.last_error = Some(error.into());
        error!(client_order_id, error = ?order.last_error, "order failed");

        let completed = active.remove(client_order_id).unwrap();
        drop(active);
        self.move_to_history(completed.clone()).await;
        Some(completed)
    }

    #[instrument(skip(self))]
    pub async fn update_cancelled(&self, client_order_id: &str) -> Option<ManagedOrder> {
        let mut active = self.shard(client_order_id).write().await;
        let order = match active.get_mut(client_order_id) {
            Some(order) => order,
            None => {
                warn!(client_order_id, "order not found");
                return None;
            }
        };
        order.state = OrderState::Cancelled;
        order.cancelled_at = Some(Utc::now());
        info!(client_order_id, "order cancelled");

        let completed = active.remove(client_order_id).unwrap();
        drop(active);
        self.move_to_history(completed.clone()).await;
        Some(completed)
    }

    pub async fn get_order(&self, client_order_id: &str) -> Option<ManagedOrder> {
        self.shard(client_order_id).read().await.get(client_order_id).cloned()
    }

    pub async fn get_order_by_exchange_id(&self, exchange_order_id: &str) -> Option<ManagedOrder> {
        let client_order_id = self.exchange_index.read().await.get(exchange_order_id).cloned()?;
        self.shard(&client_order_id).read().await.get(&client_order_id).cloned()
    }

    pub async fn active_orders(&self, symbol: Option<&str>) -> Vec<ManagedOrder> {
        let mut out = Vec::new();
        for shard in &self.active {
            out.extend(
                shard
                    .read()
                    .await
                    .values()
                    .filter(|o| symbol.is_none_or(|s| o.symbol == s))
                    .cloned(),
            );
        }
        out
    }

    /// Most recent completed orders first, up to `limit`.
    pub async fn order_history(&self, symbol: Option<&str>, limit: usize) -> Vec<ManagedOrder> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .filter(|o| symbol.is_none_or(|s| o.symbol == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> OrderManagerStats {
        let mut active = 0;
        for shard in &self.active {
            active += shard.read().await.len();
        }
        let history = self.history.read().await.len();
        OrderManagerStats {
            active_orders: active,
            history_size: history,
            total_orders: active + history,
        }
    }

    async fn move_to_history(&self, order: ManagedOrder) {
        if let Some(exchange_order_id) = &order.exchange_order_id {
            self.exchange_index.write().await.remove(exchange_order_id);
        }

        let count = (self.active_count.fetch_sub(1, Ordering::SeqCst) - 1).max(0);
        if let Some(metrics) = &self.metrics {
            metrics.set_order_manager_active("active", count as f64);
        }
        self.record_transition(order.state);

        let mut history = self.history.write().await;
        history.push_back(order);
        while history.len() > self.max_history_size {
            history.pop_front();
        }
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_order(manager: &OrderManager, client_order_id: &str) -> ManagedOrder {
        manager
            .create_order(
                client_order_id,
                "BTC/USDT",
                OrderSide::Buy,
                OrderType::Market,
                Decimal::new(1, 0),
                None,
                "binance",
                "spot",
                None,
            )
            .await
    }

    #[tokio::test]
    async fn create_then_fill_moves_order_to_history() {
        let manager = OrderManager::new(10);
        new_order(&manager, "c1").await;
        manager.update_submitted("c1", "ex1").await.unwrap();

        assert!(manager.get_order("c1").await.is_some());
        assert_eq!(manager.active_orders(None).await.len(), 1);

        manager
            .update_filled("c1", Decimal::new(1, 0), Decimal::new(100, 0), Decimal::ZERO, "USDT", false)
            .await
            .unwrap();

        assert!(manager.get_order("c1").await.is_none());
        assert_eq!(manager.order_history(None, 10).await.len(), 1);
        assert!(manager.get_order_by_exchange_id("ex1").await.is_none());
    }

    #[tokio::test]
    async fn partial_fill_keeps_order_active() {
        let manager = OrderManager::new(10);
        new_order(&manager, "c1").await;

        manager
            .update_filled("c1", Decimal::new(5, 1), Decimal::new(100, 0), Decimal::ZERO, "USDT", true)
            .await
            .unwrap();

        let order = manager.get_order("c1").await.unwrap();
        assert_eq!(order.state, OrderState::PartiallyFilled);
        assert_eq!(order.remaining_quantity(), Decimal::new(5, 1));
    }

    #[tokio::test]
    async fn history_is_capped_at_max_history_size() {
        let manager = OrderManager::new(2);
        for i in 0..3 {
            let id = format!("c{i}");
            new_order(&manager, &id).await;
            manager
                .update_failed(&id, "boom", false)
                .await
                .unwrap();
        }

        assert_eq!(manager.order_history(None, 10).await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_order_id_returns_none() {
        let manager = OrderManager::new(10);
        assert!(manager.update_submitted("missing", "ex1").await.is_none());
    }
}
