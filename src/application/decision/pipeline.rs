use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::application::decision::analyzers::SignalAnalyzer;
use crate::application::decision::confluence::ConfluenceCalculator;
use crate::application::decision::filters::SignalFilter;
use crate::domain::snapshot::AnalyticsSnapshot;
use crate::domain::trading::signal::TradeSignal;

/// Converts an analytics snapshot into at most one trade signal. Purely
/// functional in its inputs beyond the metrics it logs.
/// Grounded on `decision/engine.py`'s `DecisionEngine.evaluate`.
pub struct DecisionPipeline {
    primary_analyzers: Vec<Box<dyn SignalAnalyzer>>,
    secondary_filters: Vec<Box<dyn SignalFilter>>,
    min_confluence_score: Decimal,
    max_possible_score: Decimal,
}

impl DecisionPipeline {
    pub fn new(
        primary_analyzers: Vec<Box<dyn SignalAnalyzer>>,
        secondary_filters: Vec<Box<dyn SignalFilter>>,
        min_confluence_score: Decimal,
    ) -> Self {
        let max_possible_score = secondary_filters.iter().map(|f| f.weight()).sum();
        Self {
            primary_analyzers,
            secondary_filters,
            min_confluence_score,
            max_possible_score,
        }
    }

    pub fn max_possible_score(&self) -> Decimal {
        self.max_possible_score
    }

    pub async fn evaluate(
        &self,
        snapshot: &AnalyticsSnapshot,
        exchange: &str,
        market_type: &str,
        position_size_pct: Decimal,
    ) -> Option<TradeSignal> {
        let mut primary_results = Vec::with_capacity(self.primary_analyzers.len());
        for analyzer in &self.primary_analyzers {
            let result = analyzer.analyze(snapshot).await;
            let passed = result.passed;
            debug!(analyzer = analyzer.name(), passed, "primary analyzer result");
            primary_results.push(result);
            if !passed {
                return None;
            }
        }

        let mut filter_scores = HashMap::with_capacity(self.secondary_filters.len());
        for filter in &self.secondary_filters {
            let score = filter.evaluate(snapshot).await;
            filter_scores.insert(filter.name().to_string(), score);
        }

        let confluence = ConfluenceCalculator::calculate(
            &primary_results,
            &filter_scores,
            self.max_possible_score,
        );

        let direction = confluence.primary_direction?;
        if !confluence.primary_passed {
            return None;
        }

        if confluence.score < self.min_confluence_score {
            debug!(
                score = %confluence.score,
                threshold = %self.min_confluence_score,
                "insufficient confluence"
            );
            return None;
        }

        let signal = TradeSignal {
            symbol: snapshot.symbol.clone(),
            side: direction,
            confluence_score: confluence.score,
            primary_signals: primary_results,
            filter_scores,
            entry_price: snapshot.current_price,
            timestamp: chrono::Utc::now(),
            confidence: confluence.confidence,
            exchange: exchange.to_string(),
            market_type: market_type.to_string(),
            position_size_pct,
            stop_loss: None,
            take_profit: None,
        };

        info!(
            symbol = %signal.symbol,
            side = %signal.side,
            score = %signal.confluence_score,
            confidence = %signal.confidence,
            "trade signal generated"
        );

        Some(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::feature_names;
    use crate::domain::trading::signal::ConfidenceTag;
    use crate::domain::trading::types::OrderSide;
    use async_trait::async_trait;
    use crate::domain::trading::signal::PrimaryResult;

    struct AlwaysPass(OrderSide);

    #[async_trait]
    impl SignalAnalyzer for AlwaysPass {
        fn name(&self) -> &str {
            "always_pass"
        }
        async fn analyze(&self, _snapshot: &AnalyticsSnapshot) -> PrimaryResult {
            PrimaryResult {
                name: self.name().to_string(),
                passed: true,
                direction: Some(self.0),
                reason: "ok".into(),
            }
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl SignalAnalyzer for AlwaysFail {
        fn name(&self) -> &str {
            "always_fail"
        }
        async fn analyze(&self, _snapshot: &AnalyticsSnapshot) -> PrimaryResult {
            PrimaryResult {
                name: self.name().to_string(),
                passed: false,
                direction: None,
                reason: "nope".into(),
            }
        }
    }

    struct FixedScore(Decimal);

    #[async_trait]
    impl SignalFilter for FixedScore {
        fn name(&self) -> &str {
            "fixed"
        }
        fn weight(&self) -> Decimal {
            Decimal::new(4, 0)
        }
        async fn evaluate(&self, _snapshot: &AnalyticsSnapshot) -> Decimal {
            self.0
        }
    }

    fn snapshot() -> AnalyticsSnapshot {
        AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0))
            .with_feature(feature_names::ORDER_FLOW_IMBALANCE, Decimal::new(3, 0))
    }

    #[tokio::test]
    async fn full_confluence_yields_very_high_confidence() {
        let pipeline = DecisionPipeline::new(
            vec![Box::new(AlwaysPass(OrderSide::Buy))],
            vec![Box::new(FixedScore(Decimal::new(4, 0)))],
            Decimal::new(3, 0),
        );

        let signal = pipeline
            .evaluate(&snapshot(), "binance", "spot", Decimal::new(2, 0))
            .await
            .expect("expected a signal");

        assert_eq!(signal.confidence, ConfidenceTag::VeryHigh);
        assert_eq!(signal.side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn primary_failure_short_circuits() {
        let pipeline = DecisionPipeline::new(
            vec![Box::new(AlwaysFail)],
            vec![Box::new(FixedScore(Decimal::new(4, 0)))],
            Decimal::new(3, 0),
        );

        let signal = pipeline
            .evaluate(&snapshot(), "binance", "spot", Decimal::new(2, 0))
            .await;
        assert!(signal.is_none());
    }

    #[tokio::test]
    async fn below_threshold_confluence_yields_no_signal() {
        let pipeline = DecisionPipeline::new(
            vec![Box::new(AlwaysPass(OrderSide::Buy))],
            vec![Box::new(FixedScore(Decimal::new(1, 0)))],
            Decimal::new(3, 0),
        );

        let signal = pipeline
            .evaluate(&snapshot(), "binance", "spot", Decimal::new(2, 0))
            .await;
        assert!(signal.is_none());
    }
}
