use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::trading::signal::TradeSignal;
use crate::domain::trading::types::OrderSide;

/// The closed set of event kinds the bus knows how to route. Extending this
/// catalog is additive only — nothing here is ever removed or renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TradeTickReceived,
    CandleCompleted,
    AnalyticsUpdated,
    SignalGenerated,
    OrderPlaced,
    OrderFilled,
    PositionOpened,
    PositionClosed,
    TrailingStopHit,
    DataQualityIssue,
    PortfolioHealthDegraded,
    DumpDetected,
    CorrelatedDumpDetected,
    MaxHoldTimeExceeded,
    OrderFailed,
    SystemError,
    MarketDataConnectionLost,
    CircuitBreakerTriggered,
    ForceExitRequired,
    NotificationSent,
    NotificationFailed,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        EventKind::TradeTickReceived,
        EventKind::CandleCompleted,
        EventKind::AnalyticsUpdated,
        EventKind::SignalGenerated,
        EventKind::OrderPlaced,
        EventKind::OrderFilled,
        EventKind::PositionOpened,
        EventKind::PositionClosed,
        EventKind::TrailingStopHit,
        EventKind::DataQualityIssue,
        EventKind::PortfolioHealthDegraded,
        EventKind::DumpDetected,
        EventKind::CorrelatedDumpDetected,
        EventKind::MaxHoldTimeExceeded,
        EventKind::OrderFailed,
        EventKind::SystemError,
        EventKind::MarketDataConnectionLost,
        EventKind::CircuitBreakerTriggered,
        EventKind::ForceExitRequired,
        EventKind::NotificationSent,
        EventKind::NotificationFailed,
    ];

    /// INFO/WARNING/CRITICAL tier for this event kind. Distinct from the
    /// notification router's own event-type map, which only routes a subset.
    pub fn severity(&self) -> Severity {
        use EventKind::*;
        match self {
            OrderFailed | SystemError | MarketDataConnectionLost | CircuitBreakerTriggered
            | ForceExitRequired => Severity::Critical,
            DataQualityIssue | PortfolioHealthDegraded | DumpDetected
            | CorrelatedDumpDetected | MaxHoldTimeExceeded => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Kind-specific payloads, one variant per `EventKind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    TradeTickReceived {
        symbol: String,
        price: Decimal,
        quantity: Decimal,
    },
    CandleCompleted {
        symbol: String,
        resolution_minutes: u32,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    },
    AnalyticsUpdated {
        exchange: String,
        symbol: String,
    },
    SignalGenerated {
        signal: TradeSignal,
    },
    OrderPlaced {
        client_order_id: String,
        exchange_order_id: Option<String>,
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        price: Option<Decimal>,
    },
    OrderFilled {
        client_order_id: String,
        symbol: String,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
    },
    PositionOpened {
        position_id: String,
        symbol: String,
        exchange: String,
        market_type: String,
        side: OrderSide,
        entry_price: Decimal,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        trailing_stop_distance_pct: Option<Decimal>,
        signal_id: Option<String>,
        order_id: String,
    },
    PositionClosed {
        position_id: String,
        symbol: String,
        exit_price: Decimal,
        realized_pnl: Decimal,
        reason: String,
    },
    TrailingStopHit {
        position_id: String,
        symbol: String,
        stop_price: Decimal,
    },
    DataQualityIssue {
        symbol: String,
        description: String,
    },
    PortfolioHealthDegraded {
        description: String,
    },
    DumpDetected {
        symbol: String,
        magnitude_pct: Decimal,
    },
    CorrelatedDumpDetected {
        symbols: Vec<String>,
        magnitude_pct: Decimal,
    },
    MaxHoldTimeExceeded {
        position_id: String,
        held_seconds: i64,
    },
    OrderFailed {
        client_order_id: String,
        symbol: String,
        error: String,
    },
    SystemError {
        component: String,
        error: String,
    },
    MarketDataConnectionLost {
        exchange: String,
    },
    CircuitBreakerTriggered {
        name: String,
    },
    ForceExitRequired {
        position_id: String,
        reason: String,
    },
    NotificationSent {
        notification_type: String,
    },
    NotificationFailed {
        notification_type: String,
        error: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TradeTickReceived { .. } => EventKind::TradeTickReceived,
            EventPayload::CandleCompleted { .. } => EventKind::CandleCompleted,
            EventPayload::AnalyticsUpdated { .. } => EventKind::AnalyticsUpdated,
            EventPayload::SignalGenerated { .. } => EventKind::SignalGenerated,
            EventPayload::OrderPlaced { .. } => EventKind::OrderPlaced,
            EventPayload::OrderFilled { .. } => EventKind::OrderFilled,
            EventPayload::PositionOpened { .. } => EventKind::PositionOpened,
            EventPayload::PositionClosed { .. } => EventKind::PositionClosed,
            EventPayload::TrailingStopHit { .. } => EventKind::TrailingStopHit,
            EventPayload::DataQualityIssue { .. } => EventKind::DataQualityIssue,
            EventPayload::PortfolioHealthDegraded { .. } => EventKind::PortfolioHealthDegraded,
            EventPayload::DumpDetected { .. } => EventKind::DumpDetected,
            EventPayload::CorrelatedDumpDetected { .. } => EventKind::CorrelatedDumpDetected,
            EventPayload::MaxHoldTimeExceeded { .. } => EventKind::MaxHoldTimeExceeded,
            EventPayload::OrderFailed { .. } => EventKind::OrderFailed,
            EventPayload::SystemError { .. } => EventKind::SystemError,
            EventPayload::MarketDataConnectionLost { .. } => EventKind::MarketDataConnectionLost,
            EventPayload::CircuitBreakerTriggered { .. } => EventKind::CircuitBreakerTriggered,
            EventPayload::ForceExitRequired { .. } => EventKind::ForceExitRequired,
            EventPayload::NotificationSent { .. } => EventKind::NotificationSent,
            EventPayload::NotificationFailed { .. } => EventKind::NotificationFailed,
        }
    }
}

/// An immutable, published event. `sequence` is assigned by the bus at
/// publish time and is monotonically increasing across the whole process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_matches_catalog_tiers() {
        assert_eq!(EventKind::OrderFailed.severity(), Severity::Critical);
        assert_eq!(EventKind::DumpDetected.severity(), Severity::Warning);
        assert_eq!(EventKind::OrderPlaced.severity(), Severity::Info);
    }

    #[test]
    fn payload_kind_roundtrips() {
        let payload = EventPayload::MarketDataConnectionLost {
            exchange: "binance".into(),
        };
        assert_eq!(payload.kind(), EventKind::MarketDataConnectionLost);
    }
}
