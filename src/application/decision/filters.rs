use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::snapshot::{feature_names, AnalyticsSnapshot};

/// Weighted confluence contributor. Errors are swallowed to a zero score so
/// one misbehaving filter never aborts signal generation.
/// Grounded on `decision/filters/base.py`'s `SignalFilter.evaluate`.
#[async_trait]
pub trait SignalFilter: Send + Sync {
    fn name(&self) -> &str;
    fn weight(&self) -> Decimal;
    async fn evaluate(&self, snapshot: &AnalyticsSnapshot) -> Decimal;
}

/// Scores proximity to the point of control: closer distance -> higher score.
/// Grounded on `decision/filters/market_profile_filter.py`.
pub struct MarketProfileFilter {
    weight: Decimal,
}

impl MarketProfileFilter {
    pub fn new(weight: Decimal) -> Self {
        Self { weight }
    }
}

#[async_trait]
impl SignalFilter for MarketProfileFilter {
    fn name(&self) -> &str {
        "market_profile"
    }

    fn weight(&self) -> Decimal {
        self.weight
    }

    async fn evaluate(&self, snapshot: &AnalyticsSnapshot) -> Decimal {
        proximity_score(snapshot.feature(feature_names::POC_DISTANCE), self.weight)
    }
}

/// Grounded on `decision/filters/mean_reversion_filter.py`.
pub struct MeanReversionFilter {
    weight: Decimal,
}

impl MeanReversionFilter {
    pub fn new(weight: Decimal) -> Self {
        Self { weight }
    }
}

#[async_trait]
impl SignalFilter for MeanReversionFilter {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn weight(&self) -> Decimal {
        self.weight
    }

    async fn evaluate(&self, snapshot: &AnalyticsSnapshot) -> Decimal {
        proximity_score(
            snapshot.feature(feature_names::MEAN_REVERSION_DISTANCE),
            self.weight,
        )
    }
}

/// Grounded on `decision/filters/autocorrelation_filter.py`.
pub struct AutocorrelationFilter {
    weight: Decimal,
}

impl AutocorrelationFilter {
    pub fn new(weight: Decimal) -> Self {
        Self { weight }
    }
}

#[async_trait]
impl SignalFilter for AutocorrelationFilter {
    fn name(&self) -> &str {
        "autocorrelation"
    }

    fn weight(&self) -> Decimal {
        self.weight
    }

    async fn evaluate(&self, snapshot: &AnalyticsSnapshot) -> Decimal {
        match snapshot.feature(feature_names::AUTOCORRELATION) {
            Some(value) => (value.abs()).min(Decimal::ONE) * self.weight,
            None => {
                warn!(filter = self.name(), "autocorrelation feature missing");
                Decimal::ZERO
            }
        }
    }
}

/// Grounded on `decision/filters/demand_zone_filter.py`.
pub struct DemandZoneFilter {
    weight: Decimal,
}

impl DemandZoneFilter {
    pub fn new(weight: Decimal) -> Self {
        Self { weight }
    }
}

#[async_trait]
impl SignalFilter for DemandZoneFilter {
    fn name(&self) -> &str {
        "demand_zone"
    }

    fn weight(&self) -> Decimal {
        self.weight
    }

    async fn evaluate(&self, snapshot: &AnalyticsSnapshot) -> Decimal {
        proximity_score(
            snapshot.feature(feature_names::DEMAND_ZONE_DISTANCE),
            self.weight,
        )
    }
}

/// Grounded on `decision/filters/supply_zone_filter.py`.
pub struct SupplyZoneFilter {
    weight: Decimal,
}

impl SupplyZoneFilter {
    pub fn new(weight: Decimal) -> Self {
        Self { weight }
    }
}

#[async_trait]
impl SignalFilter for SupplyZoneFilter {
    fn name(&self) -> &str {
        "supply_zone"
    }

    fn weight(&self) -> Decimal {
        self.weight
    }

    async fn evaluate(&self, snapshot: &AnalyticsSnapshot) -> Decimal {
        proximity_score(
            snapshot.feature(feature_names::SUPPLY_ZONE_DISTANCE),
            self.weight,
        )
    }
}

/// Binary contribution: full weight if a fair value gap is present.
/// Grounded on `decision/filters/fvg_filter.py`.
pub struct FairValueGapFilter {
    weight: Decimal,
}

impl FairValueGapFilter {
    pub fn new(weight: Decimal) -> Self {
        Self { weight }
    }
}

#[async_trait]
impl SignalFilter for FairValueGapFilter {
    fn name(&self) -> &str {
        "fair_value_gap"
    }

    fn weight(&self) -> Decimal {
        self.weight
    }

    async fn evaluate(&self, snapshot: &AnalyticsSnapshot) -> Decimal {
        match snapshot.feature(feature_names::FVG_PRESENT) {
            Some(value) if value > Decimal::ZERO => self.weight,
            Some(_) => Decimal::ZERO,
            None => {
                warn!(filter = self.name(), "fvg_present feature missing");
                Decimal::ZERO
            }
        }
    }
}

/// Shared proximity curve: distance 0 scores full weight, distance >= 1
/// (normalized) scores zero, linear in between. Missing features score zero.
fn proximity_score(distance: Option<Decimal>, weight: Decimal) -> Decimal {
    match distance {
        Some(distance) => {
            let clamped = distance.abs().min(Decimal::ONE);
            (Decimal::ONE - clamped) * weight
        }
        None => Decimal::ZERO,
    }
}

/// Builds the reference filter set from the decision engine's default
/// configuration: six filters totaling 8.0 points of max confluence.
pub fn default_filters() -> Vec<Box<dyn SignalFilter>> {
    vec![
        Box::new(MarketProfileFilter::new(Decimal::new(15, 1))),
        Box::new(MeanReversionFilter::new(Decimal::new(15, 1))),
        Box::new(AutocorrelationFilter::new(Decimal::new(1, 0))),
        Box::new(DemandZoneFilter::new(Decimal::new(2, 0))),
        Box::new(SupplyZoneFilter::new(Decimal::new(5, 1))),
        Box::new(FairValueGapFilter::new(Decimal::new(15, 1))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fvg_filter_scores_full_weight_when_present() {
        let filter = FairValueGapFilter::new(Decimal::new(15, 1));
        let snapshot = AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0))
            .with_feature(feature_names::FVG_PRESENT, Decimal::ONE);
        assert_eq!(filter.evaluate(&snapshot).await, Decimal::new(15, 1));
    }

    #[tokio::test]
    async fn proximity_filter_scores_zero_at_max_distance() {
        let filter = DemandZoneFilter::new(Decimal::new(2, 0));
        let snapshot = AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0))
            .with_feature(feature_names::DEMAND_ZONE_DISTANCE, Decimal::new(2, 0));
        assert_eq!(filter.evaluate(&snapshot).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn missing_feature_scores_zero_not_error() {
        let filter = AutocorrelationFilter::new(Decimal::ONE);
        let snapshot = AnalyticsSnapshot::new("binance", "BTC/USDT", Decimal::new(50000, 0));
        assert_eq!(filter.evaluate(&snapshot).await, Decimal::ZERO);
    }

    #[test]
    fn default_filters_sum_to_eight() {
        let total: Decimal = default_filters().iter().map(|f| f.weight()).sum();
        assert_eq!(total, Decimal::new(8, 0));
    }
}
