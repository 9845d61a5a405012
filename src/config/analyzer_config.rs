//! Decision-pipeline configuration parsing from environment variables.
//!
//! Carries the confluence threshold and the secondary-filter weight table
//! bootstrap uses to construct the reference analyzer/filter set
//! (order-flow-imbalance gate, microstructure gate, and five weighted
//! secondary filters).

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

#[derive(Debug, Clone)]
pub struct AnalyzerEnvConfig {
    pub min_confluence_score: Decimal,
    pub order_flow_imbalance_threshold: Decimal,
    pub filter_weights: HashMap<String, Decimal>,
}

const DEFAULT_WEIGHTS: &[(&str, &str)] = &[
    ("market_profile_alignment", "1.5"),
    ("mean_reversion_distance", "1.5"),
    ("autocorrelation", "1.0"),
    ("demand_zone_proximity", "2.0"),
    ("supply_zone_proximity", "0.5"),
    ("fair_value_gap_presence", "1.5"),
];

impl AnalyzerEnvConfig {
    pub fn from_env() -> Result<Self> {
        let mut filter_weights = HashMap::new();
        for (name, default) in DEFAULT_WEIGHTS {
            let env_key = format!("FILTER_WEIGHT_{}", name.to_uppercase());
            filter_weights.insert((*name).to_string(), Self::parse_decimal(&env_key, default)?);
        }

        Ok(Self {
            min_confluence_score: Self::parse_decimal("MIN_CONFLUENCE_SCORE", "3.0")?,
            order_flow_imbalance_threshold: Self::parse_decimal(
                "ORDER_FLOW_IMBALANCE_THRESHOLD",
                "0.2",
            )?,
            filter_weights,
        })
    }

    fn parse_decimal(key: &str, default: &str) -> Result<Decimal> {
        let raw = env::var(key).unwrap_or_else(|_| default.to_string());
        raw.parse::<Decimal>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().and_then(Decimal::from_f64))
            .context(format!("Failed to parse {key}"))
    }
}
