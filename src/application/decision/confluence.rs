use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::trading::signal::{ConfidenceTag, PrimaryResult};
use crate::domain::trading::types::OrderSide;

/// Aggregate outcome of running primary analyzers and secondary filters over
/// one snapshot. Grounded on `decision/confluence.py`'s `ConfluenceResult`.
#[derive(Debug, Clone)]
pub struct ConfluenceResult {
    pub primary_passed: bool,
    pub primary_direction: Option<OrderSide>,
    pub score: Decimal,
    pub confidence: ConfidenceTag,
}

/// Reduces primary analyzer directions and sums weighted filter scores.
pub struct ConfluenceCalculator;

impl ConfluenceCalculator {
    /// Returns `None` if the primary directions disagree (two analyzers
    /// proposing opposite non-none sides) or if none proposed a direction.
    pub fn reduce_direction(primary_results: &[PrimaryResult]) -> Option<OrderSide> {
        let mut direction: Option<OrderSide> = None;
        for result in primary_results {
            if let Some(d) = result.direction {
                match direction {
                    None => direction = Some(d),
                    Some(existing) if existing != d => return None,
                    Some(_) => {}
                }
            }
        }
        direction
    }

    pub fn calculate(
        primary_results: &[PrimaryResult],
        filter_scores: &HashMap<String, Decimal>,
        max_possible_score: Decimal,
    ) -> ConfluenceResult {
        let primary_passed = primary_results.iter().all(|r| r.passed);
        let primary_direction = Self::reduce_direction(primary_results);
        let score: Decimal = filter_scores.values().copied().sum();
        let confidence = ConfidenceTag::classify(score, max_possible_score);

        ConfluenceResult {
            primary_passed,
            primary_direction,
            score,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(passed: bool, direction: Option<OrderSide>) -> PrimaryResult {
        PrimaryResult {
            name: "test".into(),
            passed,
            direction,
            reason: String::new(),
        }
    }

    #[test]
    fn disagreeing_directions_yield_no_signal() {
        let results = vec![
            result(true, Some(OrderSide::Buy)),
            result(true, Some(OrderSide::Sell)),
        ];
        assert_eq!(ConfluenceCalculator::reduce_direction(&results), None);
    }

    #[test]
    fn all_none_directions_yield_no_signal() {
        let results = vec![result(true, None), result(true, None)];
        assert_eq!(ConfluenceCalculator::reduce_direction(&results), None);
    }

    #[test]
    fn agreeing_directions_reduce_to_that_side() {
        let results = vec![result(true, Some(OrderSide::Buy)), result(true, None)];
        assert_eq!(
            ConfluenceCalculator::reduce_direction(&results),
            Some(OrderSide::Buy)
        );
    }
}
