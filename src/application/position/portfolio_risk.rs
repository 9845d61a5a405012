use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::events::EventPayload;
use crate::domain::position::Position;
use crate::infrastructure::event_bus::EventBus;

const MAJOR_SYMBOLS: &[&str] = &["BTC", "ETH"];
const DUMP_LOOKBACK: usize = 10;
const DUMP_THRESHOLD_PCT: i64 = 5;
const HEALTH_DEGRADED_THRESHOLD: i64 = 50;
const HEALTH_CRITICAL_THRESHOLD: i64 = 20;

fn is_major(symbol: &str) -> bool {
    let upper = symbol.to_uppercase();
    MAJOR_SYMBOLS.iter().any(|m| upper.contains(m))
}

/// Tracks recent BTC/ETH prices and open-position unrealized P&L to flag
/// portfolio-wide risk. The original `portfolio_risk_manager.py` names five
/// collaborators (`DumpDetector`, `CorrelationMonitor`, `PortfolioHealthMonitor`,
/// `DrawdownCircuitBreaker`, `HoldTimeEnforcer`) but its method bodies were not
/// recoverable from the retrieved source; this implementation is designed
/// directly from the position monitor contract instead of translated from it.
pub struct PortfolioRiskManager {
    bus: EventBus,
    major_price_history: Mutex<HashMap<String, VecDeque<Decimal>>>,
}

impl PortfolioRiskManager {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            major_price_history: Mutex::new(HashMap::new()),
        }
    }

    /// Feeds a price tick for `symbol`. When `symbol` is a major (BTC/ETH)
    /// and its recent history shows a drop beyond the dump threshold, emits
    /// `DumpDetected` for it and `CorrelatedDumpDetected` naming every other
    /// open position, since alt positions are assumed correlated to major
    /// moves absent a real correlation matrix.
    pub async fn on_price_update(&self, symbol: &str, price: Decimal, open_positions: &[Position]) {
        if !is_major(symbol) {
            return;
        }

        let magnitude_pct = {
            let mut history = self.major_price_history.lock().await;
            let window = history.entry(symbol.to_string()).or_default();
            window.push_back(price);
            if window.len() > DUMP_LOOKBACK {
                window.pop_front();
            }
            if window.len() < DUMP_LOOKBACK {
                return;
            }
            let oldest = *window.front().unwrap();
            if oldest.is_zero() {
                return;
            }
            ((oldest - price) / oldest) * Decimal::ONE_HUNDRED
        };

        if magnitude_pct < Decimal::new(DUMP_THRESHOLD_PCT, 0) {
            return;
        }

        warn!(symbol, magnitude = %magnitude_pct, "major asset dump detected");
        self.bus
            .publish(EventPayload::DumpDetected {
                symbol: symbol.to_string(),
                magnitude_pct,
            })
            .await;

        let correlated: Vec<String> = open_positions
            .iter()
            .map(|p| p.symbol.clone())
            .filter(|s| s != symbol)
            .collect();

        if !correlated.is_empty() {
            self.bus
                .publish(EventPayload::CorrelatedDumpDetected {
                    symbols: correlated,
                    magnitude_pct,
                })
                .await;
        }
    }

    /// Scores overall portfolio health from open-position unrealized P&L and
    /// emits `PortfolioHealthDegraded` / `ForceExitRequired` when the score
    /// breaches the configured thresholds.
    pub async fn assess_health(&self, open_positions: &[Position]) {
        if open_positions.is_empty() {
            return;
        }

        let losing = open_positions.iter().filter(|p| !p.is_profitable()).count();
        let losing_ratio = Decimal::new(losing as i64, 0) / Decimal::new(open_positions.len() as i64, 0);
        let score = Decimal::ONE_HUNDRED - (losing_ratio * Decimal::ONE_HUNDRED);

        if score >= Decimal::new(HEALTH_DEGRADED_THRESHOLD, 0) {
            return;
        }

        warn!(score = %score, losing, total = open_positions.len(), "portfolio health degraded");
        self.bus
            .publish(EventPayload::PortfolioHealthDegraded {
                description: format!("health score {score} ({losing}/{} positions losing)", open_positions.len()),
            })
            .await;

        if score < Decimal::new(HEALTH_CRITICAL_THRESHOLD, 0) {
            for position in open_positions.iter().filter(|p| !p.is_profitable()) {
                self.bus
                    .publish(EventPayload::ForceExitRequired {
                        position_id: position.position_id.clone(),
                        reason: format!("portfolio health critical at score {score}"),
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::domain::position::PositionState;
    use crate::domain::trading::types::OrderSide;

    fn losing_position(symbol: &str) -> Position {
        Position {
            position_id: "p1".into(),
            symbol: symbol.into(),
            exchange: "binance".into(),
            market_type: "spot".into(),
            side: OrderSide::Buy,
            entry_price: Decimal::new(100, 0),
            quantity: Decimal::new(1, 0),
            entry_time: Utc::now(),
            state: PositionState::Open,
            stop_loss: None,
            take_profit: None,
            trailing_stop_distance_pct: None,
            signal_id: None,
            entry_order_id: "o1".into(),
            current_price: Decimal::new(80, 0),
        }
    }

    #[tokio::test]
    async fn non_major_symbol_is_ignored() {
        let manager = PortfolioRiskManager::new(EventBus::new());
        manager.on_price_update("LINK/USDT", Decimal::new(10, 0), &[]).await;
        assert!(manager.major_price_history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sustained_major_drop_flags_dump() {
        let manager = PortfolioRiskManager::new(EventBus::new());
        let positions = vec![losing_position("ETH/USDT")];
        for price in [100, 100, 100, 100, 100, 100, 100, 100, 100, 90] {
            manager
                .on_price_update("BTC/USDT", Decimal::new(price, 0), &positions)
                .await;
        }
        let history = manager.major_price_history.lock().await;
        assert_eq!(history["BTC/USDT"].len(), DUMP_LOOKBACK);
    }

    #[tokio::test]
    async fn all_losing_positions_degrade_health() {
        let manager = PortfolioRiskManager::new(EventBus::new());
        manager.assess_health(&[losing_position("BTC/USDT")]).await;
    }
}
