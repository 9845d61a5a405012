use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::application::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::application::position::portfolio_risk::PortfolioRiskManager;
use crate::application::position::trailing_stop::TrailingStopManager;
use crate::domain::events::{Event, EventKind, EventPayload};
use crate::domain::ports::PositionCountProvider;
use crate::domain::position::{Position, PositionState};
use crate::infrastructure::event_bus::{EventBus, EventHandler};

const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PositionStats {
    pub open_count: usize,
    pub total_unrealized_pnl: Decimal,
}

const NAME: &str = "position_monitor";

/// Always-on component tying position tracking, the trailing-stop manager and
/// the portfolio risk manager together. Grounded on `position/monitor.py`'s
/// `PositionMonitor`.
pub struct PositionMonitor {
    bus: EventBus,
    state: Arc<ComponentState>,
    positions: RwLock<HashMap<String, Position>>,
    trailing_stop: Arc<TrailingStopManager>,
    portfolio_risk: Arc<PortfolioRiskManager>,
    background: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PositionMonitor {
    pub fn new(bus: EventBus) -> Self {
        Self {
            trailing_stop: Arc::new(TrailingStopManager::new(bus.clone())),
            portfolio_risk: Arc::new(PortfolioRiskManager::new(bus.clone())),
            bus,
            state: Arc::new(ComponentState::new()),
            positions: RwLock::new(HashMap::new()),
            background: Mutex::new(None),
        }
    }

    pub fn trailing_stop(&self) -> &Arc<TrailingStopManager> {
        &self.trailing_stop
    }

    pub fn portfolio_risk(&self) -> &Arc<PortfolioRiskManager> {
        &self.portfolio_risk
    }

    async fn track(&self, position: Position) {
        self.trailing_stop.add_position(position.clone()).await;
        self.positions.write().await.insert(position.position_id.clone(), position);
    }

    /// Forwards a price tick to the trailing-stop manager and the portfolio
    /// risk manager, and refreshes the tracked position's mark price.
    pub async fn update_price(&self, symbol: &str, price: Decimal) {
        {
            let mut positions = self.positions.write().await;
            for position in positions.values_mut() {
                if position.symbol == symbol {
                    position.update_price(price);
                }
            }
        }

        self.trailing_stop.update_on_tick(symbol, price).await;

        let open_positions: Vec<Position> = self
            .positions
            .read()
            .await
            .values()
            .filter(|p| p.state == PositionState::Open)
            .cloned()
            .collect();
        self.portfolio_risk.on_price_update(symbol, price, &open_positions).await;
        self.portfolio_risk.assess_health(&open_positions).await;
    }

    /// Closes a position immediately regardless of trailing-stop state, for
    /// callers like a `ForceExitRequired` consumer.
    pub async fn force_close_position(&self, position_id: &str, exit_price: Decimal, reason: &str) {
        self.trailing_stop.manual_exit(position_id, exit_price, reason).await;
        self.positions.write().await.remove(position_id);
    }

    /// Count of open positions, optionally scoped to one symbol. Backs the
    /// `PositionCountProvider` the risk-sizing handler queries.
    pub async fn open_position_count(&self, symbol: Option<&str>) -> usize {
        self.positions
            .read()
            .await
            .values()
            .filter(|p| p.state == PositionState::Open)
            .filter(|p| symbol.is_none_or(|s| p.symbol == s))
            .count()
    }

    pub async fn stats(&self) -> PositionStats {
        let positions = self.positions.read().await;
        let open: Vec<&Position> = positions.values().filter(|p| p.state == PositionState::Open).collect();
        let total_unrealized_pnl = open.iter().map(|p| p.unrealized_pnl()).sum();
        PositionStats {
            open_count: open.len(),
            total_unrealized_pnl,
        }
    }

    async fn log_loop(self: Arc<Self>) {
        loop {
            if !self.state.is_running() {
                break;
            }
            let stats = self.stats().await;
            if stats.open_count > 0 {
                info!(
                    open_positions = stats.open_count,
                    unrealized_pnl = %stats.total_unrealized_pnl,
                    "position monitor snapshot"
                );
            }
            tokio::time::sleep(MONITOR_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl EventHandler for PositionMonitor {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.state.record_activity();
        match &event.payload {
            EventPayload::PositionOpened {
                position_id,
                symbol,
                exchange,
                market_type,
                side,
                entry_price,
                quantity,
                stop_loss,
                take_profit,
                trailing_stop_distance_pct,
                signal_id,
                order_id,
            } => {
                let position = Position {
                    position_id: position_id.clone(),
                    symbol: symbol.clone(),
                    exchange: exchange.clone(),
                    market_type: market_type.clone(),
                    side: *side,
                    entry_price: *entry_price,
                    quantity: *quantity,
                    entry_time: Utc::now(),
                    state: PositionState::Open,
                    stop_loss: *stop_loss,
                    take_profit: *take_profit,
                    trailing_stop_distance_pct: *trailing_stop_distance_pct,
                    signal_id: signal_id.clone(),
                    entry_order_id: order_id.clone(),
                    current_price: *entry_price,
                };
                self.track(position).await;
            }
            EventPayload::TradeTickReceived { symbol, price, .. } => {
                self.update_price(symbol, *price).await;
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Component for PositionMonitor {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        self.state.set_running(true);
        self.bus
            .subscribe(EventKind::PositionOpened, self.clone())
            .await;
        self.bus
            .subscribe(EventKind::TradeTickReceived, self.clone())
            .await;

        let loop_handle = self.clone();
        let handle = tokio::spawn(async move { loop_handle.log_loop().await });
        *self.background.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        self.bus.unsubscribe(EventKind::PositionOpened, NAME).await;
        self.bus.unsubscribe(EventKind::TradeTickReceived, NAME).await;
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

#[async_trait]
impl PositionCountProvider for PositionMonitor {
    async fn open_position_count(&self, symbol: Option<&str>) -> usize {
        PositionMonitor::open_position_count(self, symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::OrderSide;

    fn opened_event() -> Event {
        Event {
            sequence: 0,
            timestamp: Utc::now(),
            payload: EventPayload::PositionOpened {
                position_id: "pos-1".into(),
                symbol: "BTC/USDT".into(),
                exchange: "binance".into(),
                market_type: "spot".into(),
                side: OrderSide::Buy,
                entry_price: Decimal::new(100, 0),
                quantity: Decimal::new(1, 0),
                stop_loss: None,
                take_profit: None,
                trailing_stop_distance_pct: None,
                signal_id: None,
                order_id: "ord-1".into(),
            },
        }
    }

    #[tokio::test]
    async fn position_opened_is_tracked() {
        let monitor = PositionMonitor::new(EventBus::new());
        monitor.handle(&opened_event()).await.unwrap();
        let stats = monitor.stats().await;
        assert_eq!(stats.open_count, 1);
    }

    #[tokio::test]
    async fn price_update_refreshes_unrealized_pnl() {
        let monitor = PositionMonitor::new(EventBus::new());
        monitor.handle(&opened_event()).await.unwrap();
        monitor.update_price("BTC/USDT", Decimal::new(110, 0)).await;
        let stats = monitor.stats().await;
        assert_eq!(stats.total_unrealized_pnl, Decimal::new(10, 0));
    }

    #[tokio::test]
    async fn trade_tick_event_refreshes_unrealized_pnl() {
        let monitor = PositionMonitor::new(EventBus::new());
        monitor.handle(&opened_event()).await.unwrap();
        let tick = Event {
            sequence: 1,
            timestamp: Utc::now(),
            payload: EventPayload::TradeTickReceived {
                symbol: "BTC/USDT".into(),
                price: Decimal::new(110, 0),
                quantity: Decimal::new(1, 0),
            },
        };
        monitor.handle(&tick).await.unwrap();
        let stats = monitor.stats().await;
        assert_eq!(stats.total_unrealized_pnl, Decimal::new(10, 0));
    }

    #[tokio::test]
    async fn force_close_removes_tracked_position() {
        let monitor = PositionMonitor::new(EventBus::new());
        monitor.handle(&opened_event()).await.unwrap();
        monitor.force_close_position("pos-1", Decimal::new(105, 0), "manual").await;
        let stats = monitor.stats().await;
        assert_eq!(stats.open_count, 0);
    }
}
