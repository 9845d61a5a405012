use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{OrderSide, OrderType};

/// Lifecycle state of a managed order. `OrderManager` is the only writer
/// of this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Submitted,
    Active,
    PartiallyFilled,
    Filled,
    Rejected,
    Failed,
    Cancelled,
}

impl OrderState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderState::Submitted | OrderState::Active | OrderState::PartiallyFilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Rejected | OrderState::Failed | OrderState::Cancelled
        )
    }
}

/// The engine's authoritative, mutable record of one order's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,

    pub exchange: String,
    pub market_type: String,

    pub state: OrderState,

    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub commission: Decimal,
    pub commission_asset: String,

    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    pub signal_id: Option<String>,

    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl ManagedOrder {
    pub fn new(
        client_order_id: String,
        symbol: String,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        exchange: String,
        market_type: String,
        signal_id: Option<String>,
    ) -> Self {
        Self {
            client_order_id,
            exchange_order_id: None,
            symbol,
            side,
            order_type,
            quantity,
            price,
            exchange,
            market_type,
            state: OrderState::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            commission: Decimal::ZERO,
            commission_asset: "USDT".to_string(),
            created_at: Utc::now(),
            submitted_at: None,
            filled_at: None,
            cancelled_at: None,
            signal_id,
            retry_count: 0,
            last_error: None,
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn fill_percentage(&self) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            (self.filled_quantity / self.quantity) * Decimal::ONE_HUNDRED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> ManagedOrder {
        ManagedOrder::new(
            "c1".into(),
            "BTC/USDT".into(),
            OrderSide::Buy,
            OrderType::Market,
            Decimal::new(1, 0),
            None,
            "binance".into(),
            "spot".into(),
            None,
        )
    }

    #[test]
    fn new_order_is_pending_and_not_terminal() {
        let o = order();
        assert_eq!(o.state, OrderState::Pending);
        assert!(!o.state.is_terminal());
        assert!(!o.state.is_active());
    }

    #[test]
    fn fill_percentage_zero_quantity_is_zero_not_nan() {
        let mut o = order();
        o.quantity = Decimal::ZERO;
        assert_eq!(o.fill_percentage(), Decimal::ZERO);
    }

    #[test]
    fn remaining_quantity_tracks_fills() {
        let mut o = order();
        o.filled_quantity = Decimal::new(4, 1); // 0.4
        assert_eq!(o.remaining_quantity(), Decimal::new(6, 1)); // 0.6
    }
}
