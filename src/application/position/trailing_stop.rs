use std::collections::HashMap;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::events::EventPayload;
use crate::domain::position::Position;
use crate::domain::trading::types::OrderSide;
use crate::infrastructure::event_bus::EventBus;

/// Drives the trailing distance chosen for a newly-tracked position.
/// Grounded on `position/trailing_stop.py`'s `TRAILING_DISTANCE_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    CryptoMajor,
    CryptoMeme,
    CryptoRegular,
}

const MEME_KEYWORDS: &[&str] = &["DOGE", "SHIB", "PEPE", "BONK", "WIF", "MEME", "FLOKI"];

impl AssetType {
    pub fn detect(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        if upper.contains("BTC") || upper.contains("ETH") {
            return AssetType::CryptoMajor;
        }
        if MEME_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
            return AssetType::CryptoMeme;
        }
        AssetType::CryptoRegular
    }

    pub fn trailing_distance_pct(&self) -> Decimal {
        match self {
            AssetType::CryptoMajor => Decimal::new(3, 1),    // 0.3%
            AssetType::CryptoMeme => Decimal::new(175, 1),   // 17.5%
            AssetType::CryptoRegular => Decimal::new(5, 1),  // 0.5%
        }
    }
}

struct Tracked {
    position: Position,
    trailing_distance_pct: Decimal,
    stop_price: Decimal,
    extreme_price: Decimal,
}

fn initial_stop(side: OrderSide, entry_price: Decimal, distance_pct: Decimal) -> Decimal {
    let distance = entry_price * (distance_pct / Decimal::ONE_HUNDRED);
    match side {
        OrderSide::Buy => entry_price - distance,
        OrderSide::Sell => entry_price + distance,
    }
}

/// Ratchets a stop toward price as it moves favorably and emits
/// `PositionClosed` the moment the stop is touched. Grounded on
/// `position/trailing_stop.py`'s `TrailingStopManager`.
pub struct TrailingStopManager {
    bus: EventBus,
    tracked: RwLock<HashMap<String, Tracked>>,
}

impl TrailingStopManager {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            tracked: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_position(&self, mut position: Position) {
        let asset_type = AssetType::detect(&position.symbol);
        let distance_pct = asset_type.trailing_distance_pct();
        let stop_price = initial_stop(position.side, position.entry_price, distance_pct);
        position.trailing_stop_distance_pct = Some(distance_pct);

        info!(
            symbol = %position.symbol,
            side = %position.side,
            entry = %position.entry_price,
            stop = %stop_price,
            distance_pct = %distance_pct,
            "tracking position for trailing stop"
        );

        self.tracked.write().await.insert(
            position.position_id.clone(),
            Tracked {
                extreme_price: position.entry_price,
                position,
                trailing_distance_pct: distance_pct,
                stop_price,
            },
        );
    }

    /// Updates every tracked position for `symbol`, ratcheting stops and
    /// closing any position whose stop was touched by `current_price`.
    pub async fn update_on_tick(&self, symbol: &str, current_price: Decimal) {
        let touched: Vec<String> = {
            let mut tracked = self.tracked.write().await;
            let mut touched = Vec::new();

            for (position_id, entry) in tracked.iter_mut() {
                if entry.position.symbol != symbol {
                    continue;
                }
                entry.position.update_price(current_price);

                match entry.position.side {
                    OrderSide::Buy => {
                        if current_price > entry.extreme_price {
                            entry.extreme_price = current_price;
                            let distance = current_price * (entry.trailing_distance_pct / Decimal::ONE_HUNDRED);
                            let new_stop = current_price - distance;
                            if new_stop > entry.stop_price {
                                debug!(symbol, stop = %new_stop, "trailing stop raised");
                                entry.stop_price = new_stop;
                            }
                        }
                        if current_price <= entry.stop_price {
                            touched.push(position_id.clone());
                        }
                    }
                    OrderSide::Sell => {
                        if current_price < entry.extreme_price {
                            entry.extreme_price = current_price;
                            let distance = current_price * (entry.trailing_distance_pct / Decimal::ONE_HUNDRED);
                            let new_stop = current_price + distance;
                            if new_stop < entry.stop_price {
                                debug!(symbol, stop = %new_stop, "trailing stop lowered");
                                entry.stop_price = new_stop;
                            }
                        }
                        if current_price >= entry.stop_price {
                            touched.push(position_id.clone());
                        }
                    }
                }
            }
            touched
        };

        for position_id in touched {
            self.trigger_stop(&position_id, current_price).await;
        }
    }

    async fn trigger_stop(&self, position_id: &str, exit_price: Decimal) {
        let entry = self.tracked.write().await.remove(position_id);
        let Some(entry) = entry else { return };

        let realized_pnl = match entry.position.side {
            OrderSide::Buy => (exit_price - entry.position.entry_price) * entry.position.quantity,
            OrderSide::Sell => (entry.position.entry_price - exit_price) * entry.position.quantity,
        };

        warn!(
            symbol = %entry.position.symbol,
            entry = %entry.position.entry_price,
            exit = %exit_price,
            pnl = %realized_pnl,
            "trailing stop triggered"
        );

        self.bus
            .publish(EventPayload::TrailingStopHit {
                position_id: position_id.to_string(),
                symbol: entry.position.symbol.clone(),
                stop_price: entry.stop_price,
            })
            .await;

        self.bus
            .publish(EventPayload::PositionClosed {
                position_id: position_id.to_string(),
                symbol: entry.position.symbol,
                exit_price,
                realized_pnl,
                reason: "trailing_stop".to_string(),
            })
            .await;
    }

    /// Closes a position immediately regardless of trailing-stop state, for
    /// callers like a `ForceExitRequired` consumer.
    pub async fn manual_exit(&self, position_id: &str, exit_price: Decimal, reason: &str) {
        let entry = self.tracked.write().await.remove(position_id);
        let Some(entry) = entry else {
            warn!(position_id, "position not found for manual exit");
            return;
        };

        let realized_pnl = match entry.position.side {
            OrderSide::Buy => (exit_price - entry.position.entry_price) * entry.position.quantity,
            OrderSide::Sell => (entry.position.entry_price - exit_price) * entry.position.quantity,
        };

        info!(symbol = %entry.position.symbol, reason, pnl = %realized_pnl, "manual position exit");

        self.bus
            .publish(EventPayload::PositionClosed {
                position_id: position_id.to_string(),
                symbol: entry.position.symbol,
                exit_price,
                realized_pnl,
                reason: reason.to_string(),
            })
            .await;
    }

    pub async fn remove_position(&self, position_id: &str) {
        self.tracked.write().await.remove(position_id);
    }

    pub async fn contains(&self, position_id: &str) -> bool {
        self.tracked.read().await.contains_key(position_id)
    }

    pub async fn tracked_count(&self) -> usize {
        self.tracked.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::domain::position::PositionState;

    fn position(symbol: &str, side: OrderSide, entry: i64) -> Position {
        Position {
            position_id: "p1".into(),
            symbol: symbol.into(),
            exchange: "binance".into(),
            market_type: "spot".into(),
            side,
            entry_price: Decimal::new(entry, 0),
            quantity: Decimal::new(1, 0),
            entry_time: Utc::now(),
            state: PositionState::Open,
            stop_loss: None,
            take_profit: None,
            trailing_stop_distance_pct: None,
            signal_id: None,
            entry_order_id: "o1".into(),
            current_price: Decimal::new(entry, 0),
        }
    }

    #[test]
    fn meme_keyword_picks_wide_trailing_distance() {
        assert_eq!(AssetType::detect("DOGE/USDT"), AssetType::CryptoMeme);
        assert_eq!(AssetType::detect("BTC/USDT"), AssetType::CryptoMajor);
        assert_eq!(AssetType::detect("LINK/USDT"), AssetType::CryptoRegular);
    }

    #[tokio::test]
    async fn stop_ratchets_up_and_never_down_for_long() {
        let manager = TrailingStopManager::new(EventBus::new());
        manager.add_position(position("BTC/USDT", OrderSide::Buy, 100)).await;

        manager.update_on_tick("BTC/USDT", Decimal::new(110, 0)).await;
        assert!(manager.contains("p1").await);

        // price pulls back but stays above the newly-raised stop
        manager.update_on_tick("BTC/USDT", Decimal::new(109, 0)).await;
        assert!(manager.contains("p1").await);
    }

    #[tokio::test]
    async fn stop_touch_closes_and_removes_position() {
        let manager = TrailingStopManager::new(EventBus::new());
        manager.add_position(position("BTC/USDT", OrderSide::Buy, 100)).await;

        // 0.3% of 100 = 0.3, initial stop ~99.7; drop below it
        manager.update_on_tick("BTC/USDT", Decimal::new(99, 0)).await;
        assert!(!manager.contains("p1").await);
    }

    #[tokio::test]
    async fn manual_exit_removes_tracked_position() {
        let manager = TrailingStopManager::new(EventBus::new());
        manager.add_position(position("BTC/USDT", OrderSide::Buy, 100)).await;
        manager.manual_exit("p1", Decimal::new(105, 0), "force exit").await;
        assert!(!manager.contains("p1").await);
    }
}
