use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trading::types::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Open,
    Closed,
}

/// Grounded on the source position monitor's `Position` record: opened on
/// `PositionOpened`, tracked by the position monitor, closed on
/// `PositionClosed`/`TrailingStopHit`/a forced exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub symbol: String,
    pub exchange: String,
    pub market_type: String,
    pub side: OrderSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub state: PositionState,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub trailing_stop_distance_pct: Option<Decimal>,
    pub signal_id: Option<String>,
    pub entry_order_id: String,
    pub current_price: Decimal,
}

impl Position {
    pub fn unrealized_pnl(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => (self.current_price - self.entry_price) * self.quantity,
            OrderSide::Sell => (self.entry_price - self.current_price) * self.quantity,
        }
    }

    pub fn is_profitable(&self) -> bool {
        self.unrealized_pnl() > Decimal::ZERO
    }

    pub fn update_price(&mut self, price: Decimal) {
        self.current_price = price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(side: OrderSide, entry: i64, current: i64) -> Position {
        Position {
            position_id: "p1".into(),
            symbol: "BTC/USDT".into(),
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
            current_price: Decimal::new(current, 0),
        }
    }

    #[test]
    fn buy_pnl_is_positive_when_price_rises() {
        let p = position(OrderSide::Buy, 100, 110);
        assert_eq!(p.unrealized_pnl(), Decimal::new(10, 0));
        assert!(p.is_profitable());
    }

    #[test]
    fn sell_pnl_is_positive_when_price_falls() {
        let p = position(OrderSide::Sell, 100, 90);
        assert_eq!(p.unrealized_pnl(), Decimal::new(10, 0));
        assert!(p.is_profitable());
    }
}
