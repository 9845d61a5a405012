use async_trait::async_trait;

use crate::domain::snapshot::AnalyticsSnapshot;
use crate::domain::trading::signal::PrimaryResult;
use crate::domain::trading::types::OrderSide;

/// Hard gate evaluated in order; a failure short-circuits signal generation.
/// Grounded on `decision/analyzers/base.py`'s `SignalAnalyzer.analyze`.
#[async_trait]
pub trait SignalAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze(&self, snapshot: &AnalyticsSnapshot) -> PrimaryResult;
}

/// Flags order-flow imbalance beyond a threshold in either direction.
/// Grounded on `decision/analyzers/order_flow_analyzer.py` (`OrderFlowAnalyzer`).
pub struct OrderFlowAnalyzer {
    threshold: rust_decimal::Decimal,
}

impl OrderFlowAnalyzer {
    pub fn new(threshold: rust_decimal::Decimal) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl SignalAnalyzer for OrderFlowAnalyzer {
    fn name(&self) -> &str {
        "order_flow"
    }

    async fn analyze(&self, snapshot: &AnalyticsSnapshot) -> PrimaryResult {
        let imbalance = match snapshot.feature(crate::domain::snapshot::feature_names::ORDER_FLOW_IMBALANCE) {
            Some(v) => v,
            None => {
                return PrimaryResult {
                    name: self.name().to_string(),
                    passed: false,
                    direction: None,
                    reason: "order_flow_imbalance feature missing".into(),
                }
            }
        };

        if imbalance >= self.threshold {
            PrimaryResult {
                name: self.name().to_string(),
                passed: true,
                direction: Some(OrderSide::Buy),
                reason: format!("imbalance {imbalance} >= threshold {}", self.threshold),
            }
        } else if imbalance <= -self.threshold {
            PrimaryResult {
                name: self.name().to_string(),
                passed: true,
                direction: Some(OrderSide::Sell),
                reason: format!("imbalance {imbalance} <= -threshold {}", self.threshold),
            }
        } else {
            PrimaryResult {
                name: self.name().to_string(),
                passed: false,
                direction: None,
                reason: format!("imbalance {imbalance} within threshold {}", self.threshold),
            }
        }
    }
}

/// Confirms a tradeable spread and sufficient book depth. Does not itself
/// propose a direction; it gates on market quality alone.
/// Grounded on `decision/analyzers/microstructure_analyzer.py`.
pub struct MicrostructureAnalyzer {
    max_spread: rust_decimal::Decimal,
    min_depth: rust_decimal::Decimal,
}

impl MicrostructureAnalyzer {
    pub fn new(max_spread: rust_decimal::Decimal, min_depth: rust_decimal::Decimal) -> Self {
        Self { max_spread, min_depth }
    }
}

#[async_trait]
impl SignalAnalyzer for MicrostructureAnalyzer {
    fn name(&self) -> &str {
        "microstructure"
    }

    async fn analyze(&self, snapshot: &AnalyticsSnapshot) -> PrimaryResult {
        let spread = snapshot.feature(crate::domain::snapshot::feature_names::SPREAD);
        let depth = snapshot.feature(crate::domain::snapshot::feature_names::DEPTH);

        let passed = match (spread, depth) {
            (Some(spread), Some(depth)) => spread <= self.max_spread && depth >= self.min_depth,
            _ => false,
        };

        PrimaryResult {
            name: self.name().to_string(),
            passed,
            direction: None,
            reason: if passed {
                "spread and depth within bounds".into()
            } else {
                "spread/depth missing or out of bounds".into()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn snapshot_with(feature: &str, value: Decimal) -> AnalyticsSnapshot {
        AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0))
            .with_feature(feature, value)
    }

    #[tokio::test]
    async fn order_flow_buys_above_positive_threshold() {
        let analyzer = OrderFlowAnalyzer::new(Decimal::new(25, 1));
        let snapshot = snapshot_with(
            crate::domain::snapshot::feature_names::ORDER_FLOW_IMBALANCE,
            Decimal::new(3, 0),
        );
        let result = analyzer.analyze(&snapshot).await;
        assert!(result.passed);
        assert_eq!(result.direction, Some(OrderSide::Buy));
    }

    #[tokio::test]
    async fn order_flow_fails_within_threshold() {
        let analyzer = OrderFlowAnalyzer::new(Decimal::new(25, 1));
        let snapshot = snapshot_with(
            crate::domain::snapshot::feature_names::ORDER_FLOW_IMBALANCE,
            Decimal::new(1, 0),
        );
        let result = analyzer.analyze(&snapshot).await;
        assert!(!result.passed);
        assert_eq!(result.direction, None);
    }

    #[tokio::test]
    async fn microstructure_fails_when_feature_missing() {
        let analyzer = MicrostructureAnalyzer::new(Decimal::new(5, 1), Decimal::new(1000, 0));
        let snapshot = AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0));
        let result = analyzer.analyze(&snapshot).await;
        assert!(!result.passed);
    }
}
