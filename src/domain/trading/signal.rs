use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::types::OrderSide;

/// Outcome of one primary analyzer's evaluation of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryResult {
    pub name: String,
    pub passed: bool,
    pub direction: Option<OrderSide>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTag {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl fmt::Display for ConfidenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTag::Low => write!(f, "LOW"),
            ConfidenceTag::Medium => write!(f, "MEDIUM"),
            ConfidenceTag::High => write!(f, "HIGH"),
            ConfidenceTag::VeryHigh => write!(f, "VERY_HIGH"),
        }
    }
}

impl ConfidenceTag {
    /// Classify confidence by `score / max_possible` per the decision pipeline
    /// algorithm: <0.5 LOW, <0.7 MEDIUM, <0.85 HIGH, else VERY_HIGH.
    pub fn classify(score: Decimal, max_possible: Decimal) -> Self {
        if max_possible.is_zero() {
            return ConfidenceTag::Low;
        }
        let ratio = score / max_possible;
        if ratio < Decimal::new(5, 1) {
            ConfidenceTag::Low
        } else if ratio < Decimal::new(7, 1) {
            ConfidenceTag::Medium
        } else if ratio < Decimal::new(85, 2) {
            ConfidenceTag::High
        } else {
            ConfidenceTag::VeryHigh
        }
    }
}

/// Immutable output of the decision pipeline; consumed by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub side: OrderSide,
    pub confluence_score: Decimal,
    pub primary_signals: Vec<PrimaryResult>,
    pub filter_scores: HashMap<String, Decimal>,
    pub entry_price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub confidence: ConfidenceTag,
    /// Exchange and market type this signal targets, used by the execution
    /// pipeline to select an adapter and by validation's exchange whitelist.
    pub exchange: String,
    pub market_type: String,
    /// Requested position size as a percent of account balance, e.g. 2.0 for 2%.
    pub position_size_pct: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}
