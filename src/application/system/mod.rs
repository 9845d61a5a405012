//! Wires every component from `Config` into a running system and tears it
//! down on shutdown. Grounded on `application/system/mod.rs`'s
//! `Application::build`/`start`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::info;

use crate::application::decision::analyzers::{MicrostructureAnalyzer, OrderFlowAnalyzer};
use crate::application::decision::engine::DecisionEngine;
use crate::application::decision::filters::{
    AutocorrelationFilter, DemandZoneFilter, FairValueGapFilter, MarketProfileFilter, MeanReversionFilter,
    SupplyZoneFilter,
};
use crate::application::decision::pipeline::DecisionPipeline;
use crate::application::execution::engine::ExecutionEngine;
use crate::application::execution::handlers::order_placement::OrderPlacementHandler;
use crate::application::execution::handlers::reconciliation::ReconciliationHandler;
use crate::application::execution::handlers::risk_sizing::RiskSizingHandler;
use crate::application::execution::handlers::validator::ValidationHandler;
use crate::application::execution::order_manager::OrderManager;
use crate::application::execution::pipeline::ExecutionPipeline;
use crate::application::lifecycle::Component;
use crate::application::market_data::InMemorySnapshotCache;
use crate::application::notifications::router::NotificationRouter;
use crate::application::position::monitor::PositionMonitor;
use crate::application::storage::persistence::StoragePersistence;
use crate::config::{Config, Mode};
use crate::domain::ports::ExchangeAdapter;
use crate::domain::trading::types::OrderType;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::exchange::factory::ExchangeFactory;
use crate::infrastructure::notifications::LogNotificationSender;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::storage::SqliteStorageSink;

const ORDER_HISTORY_SIZE: usize = 1000;
const BACKOFF_FACTOR: f64 = 2.0;
const RECONCILIATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECONCILIATION_MAX_WAIT: Duration = Duration::from_secs(30);
const RECONCILIATION_MIN_FILL_RATIO: &str = "0.95";
const RECONCILIATION_MAX_SLIPPAGE_PCT: &str = "1.0";
const BALANCE_ASSET: &str = "USDT";
const DEFAULT_MARKET_TYPE: &str = "spot";

fn dec(s: &str) -> Decimal {
    s.parse().expect("constant decimal literal")
}

fn build_decision_pipeline(config: &Config) -> DecisionPipeline {
    let weights = &config.analyzer.filter_weights;
    let weight = |key: &str| weights.get(key).copied().unwrap_or(Decimal::ONE);

    let primary_analyzers = vec![
        Box::new(OrderFlowAnalyzer::new(config.analyzer.order_flow_imbalance_threshold))
            as Box<dyn crate::application::decision::analyzers::SignalAnalyzer>,
        Box::new(MicrostructureAnalyzer::new(dec("0.5"), dec("1000"))),
    ];
    let secondary_filters = vec![
        Box::new(MarketProfileFilter::new(weight("market_profile_alignment")))
            as Box<dyn crate::application::decision::filters::SignalFilter>,
        Box::new(MeanReversionFilter::new(weight("mean_reversion_distance"))),
        Box::new(AutocorrelationFilter::new(weight("autocorrelation"))),
        Box::new(DemandZoneFilter::new(weight("demand_zone_proximity"))),
        Box::new(SupplyZoneFilter::new(weight("supply_zone_proximity"))),
        Box::new(FairValueGapFilter::new(weight("fair_value_gap_presence"))),
    ];

    DecisionPipeline::new(primary_analyzers, secondary_filters, config.analyzer.min_confluence_score)
}

fn build_execution_pipeline(
    config: &Config,
    exchange_name: &str,
    exchange: Arc<dyn ExchangeAdapter>,
    balances: Arc<ExchangeFactory>,
    positions: Arc<PositionMonitor>,
) -> ExecutionPipeline {
    let risk = &config.risk;

    let validation = ValidationHandler::new(
        config.analyzer.min_confluence_score,
        config.analyzer.min_confluence_score + dec("10"),
        vec![exchange_name.to_string()],
    );
    let risk_sizing = RiskSizingHandler::new(
        risk.max_concurrent_positions,
        risk.default_position_size_pct,
        risk.max_position_size_pct,
        risk.min_risk_reward_ratio,
        risk.max_stop_loss_distance_pct,
        BALANCE_ASSET,
        balances,
        positions,
    );
    let order_placement = OrderPlacementHandler::new(
        risk.max_retries,
        Duration::from_millis(risk.retry_backoff_base_ms),
        Duration::from_millis(risk.retry_backoff_max_ms),
        BACKOFF_FACTOR,
        true,
        exchange.clone(),
    );
    let reconciliation = ReconciliationHandler::new(
        true,
        dec(RECONCILIATION_MAX_SLIPPAGE_PCT),
        RECONCILIATION_POLL_INTERVAL,
        RECONCILIATION_MAX_WAIT,
        dec(RECONCILIATION_MIN_FILL_RATIO),
        exchange,
    );

    ExecutionPipeline::new(vec![
        Box::new(validation),
        Box::new(risk_sizing),
        Box::new(order_placement),
        Box::new(reconciliation),
    ])
}

/// Every long-lived component the running system owns. Dropping this stops
/// nothing by itself — call `shutdown` to disconnect exchanges and flip
/// every component's running flag off.
pub struct System {
    pub bus: EventBus,
    pub exchanges: Arc<ExchangeFactory>,
    pub storage: Arc<SqliteStorageSink>,
    pub snapshot_cache: Arc<InMemorySnapshotCache>,
    pub decision_engine: Arc<DecisionEngine>,
    pub execution_engine: Arc<ExecutionEngine>,
    pub notification_router: Arc<NotificationRouter>,
    pub position_monitor: Arc<PositionMonitor>,
    pub storage_persistence: Arc<StoragePersistence>,
    pub metrics: Metrics,
}

impl System {
    /// Builds every component, wires the event-bus subscriptions, and
    /// starts the reactive pipeline. Mirrors `Application::build` +
    /// `Application::start`, collapsed into one step since nothing here
    /// needs to be built without also running.
    pub async fn start(config: Config) -> Result<Self> {
        let bus = EventBus::new();
        let metrics = Metrics::new()?;
        bus.attach_metrics(metrics.clone()).await;

        let exchange_name = match config.mode {
            Mode::Mock => "mock",
            Mode::Binance => "binance",
        };

        let exchanges = Arc::new(ExchangeFactory::new(config.clone()).with_metrics(metrics.clone()));
        let exchange = exchanges.acquire(exchange_name, DEFAULT_MARKET_TYPE, false).await?;

        let storage = Arc::new(
            SqliteStorageSink::new(
                std::path::PathBuf::from("data"),
                config.risk.connection_pool_size,
                config.risk.tick_retention_hours,
                config.risk.candle_retention_days,
            )
            .with_metrics(metrics.clone()),
        );

        let snapshot_cache = Arc::new(InMemorySnapshotCache::new(bus.clone(), exchange_name));
        snapshot_cache.clone().start().await?;

        let position_monitor = Arc::new(PositionMonitor::new(bus.clone()));
        position_monitor.clone().start().await?;

        let order_manager = Arc::new(OrderManager::new(ORDER_HISTORY_SIZE).with_metrics(metrics.clone()));
        let execution_pipeline = build_execution_pipeline(
            &config,
            exchange_name,
            exchange,
            exchanges.clone(),
            position_monitor.clone(),
        );
        let execution_engine = Arc::new(ExecutionEngine::new(
            execution_pipeline,
            order_manager,
            bus.clone(),
            OrderType::Market,
        ));
        execution_engine.clone().start().await?;

        let decision_pipeline = build_decision_pipeline(&config);
        let decision_engine = Arc::new(DecisionEngine::new(
            decision_pipeline,
            snapshot_cache.clone(),
            bus.clone(),
            DEFAULT_MARKET_TYPE,
            config.risk.default_position_size_pct,
        ));
        decision_engine.clone().start().await?;

        let notification_sender = Arc::new(LogNotificationSender::new(&config.notification));
        let notification_router =
            Arc::new(NotificationRouter::new(notification_sender, bus.clone()).with_metrics(metrics.clone()));
        notification_router.clone().start().await?;

        let storage_persistence = Arc::new(StoragePersistence::new(
            bus.clone(),
            exchange_name,
            storage.clone(),
            snapshot_cache.clone(),
        ));
        storage_persistence.clone().start().await?;

        info!(exchange = exchange_name, symbols = ?config.risk.symbols, "system started");

        Ok(Self {
            bus,
            exchanges,
            storage,
            snapshot_cache,
            decision_engine,
            execution_engine,
            notification_router,
            position_monitor,
            storage_persistence,
            metrics,
        })
    }

    /// Disconnects every cached exchange adapter and stops every reactive
    /// component. Each `stop()` unsubscribes the component from the bus and
    /// aborts its own background loop (if any); `bus.stop()` then drains the
    /// per-kind subscriber worker tasks.
    pub async fn shutdown(&self) {
        self.decision_engine.clone().stop().await.ok();
        self.execution_engine.clone().stop().await.ok();
        self.notification_router.clone().stop().await.ok();
        self.position_monitor.clone().stop().await.ok();
        self.snapshot_cache.clone().stop().await.ok();
        self.storage_persistence.clone().stop().await.ok();

        self.exchanges.disconnect_all().await;
        self.bus.stop(Duration::from_secs(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_starts_and_shuts_down_in_mock_mode() {
        let config = Config::from_env().expect("default config should parse");
        let system = System::start(config).await.expect("system should start in mock mode");
        assert_eq!(system.exchanges.cached_count().await, 1);
        system.shutdown().await;
    }
}
