use rust_decimal::Decimal;
use std::collections::HashMap;

/// Per-symbol bag of derived analytics values. Schema is open: consumers
/// access features by declared name, and absence means "not computed" rather
/// than zero. Snapshots are cached by (exchange, symbol) and superseded
/// atomically by the analytics collaborator that owns them.
#[derive(Debug, Clone)]
pub struct AnalyticsSnapshot {
    pub exchange: String,
    pub symbol: String,
    pub current_price: Decimal,
    pub features: HashMap<String, Decimal>,
}

impl AnalyticsSnapshot {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>, current_price: Decimal) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            current_price,
            features: HashMap::new(),
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: Decimal) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    pub fn feature(&self, name: &str) -> Option<Decimal> {
        self.features.get(name).copied()
    }
}

/// Feature names the reference analyzer/filter set declares. Other
/// analyzers may use different names; the schema is otherwise open.
pub mod feature_names {
    pub const ORDER_FLOW_IMBALANCE: &str = "order_flow_imbalance";
    pub const SPREAD: &str = "spread";
    pub const DEPTH: &str = "depth";
    pub const POC_DISTANCE: &str = "poc_distance";
    pub const MEAN_REVERSION_DISTANCE: &str = "mean_reversion_distance";
    pub const AUTOCORRELATION: &str = "autocorrelation";
    pub const DEMAND_ZONE_DISTANCE: &str = "demand_zone_distance";
    pub const SUPPLY_ZONE_DISTANCE: &str = "supply_zone_distance";
    pub const FVG_PRESENT: &str = "fvg_present";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_feature_is_none_not_zero() {
        let snapshot = AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0));
        assert_eq!(snapshot.feature(feature_names::SPREAD), None);
    }

    #[test]
    fn with_feature_sets_value() {
        let snapshot = AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0))
            .with_feature(feature_names::ORDER_FLOW_IMBALANCE, Decimal::new(3, 0));
        assert_eq!(
            snapshot.feature(feature_names::ORDER_FLOW_IMBALANCE),
            Some(Decimal::new(3, 0))
        );
    }
}
