use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use crate::application::decision::pipeline::DecisionPipeline;
use crate::application::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::domain::events::{Event, EventKind, EventPayload};
use crate::domain::ports::SnapshotProvider;
use crate::infrastructure::event_bus::{EventBus, EventHandler};

/// Reactive component: subscribes to `AnalyticsUpdated`, looks the refreshed
/// snapshot up via the injected provider, runs it through the pipeline, and
/// publishes `SignalGenerated` on a hit. Grounded on `decision/engine.py`'s
/// `DecisionEngine.on_analytics_event`.
pub struct DecisionEngine {
    pipeline: DecisionPipeline,
    snapshots: Arc<dyn SnapshotProvider>,
    bus: EventBus,
    state: Arc<ComponentState>,
    default_market_type: String,
    default_position_size_pct: Decimal,
}

impl DecisionEngine {
    pub fn new(
        pipeline: DecisionPipeline,
        snapshots: Arc<dyn SnapshotProvider>,
        bus: EventBus,
        default_market_type: impl Into<String>,
        default_position_size_pct: Decimal,
    ) -> Self {
        Self {
            pipeline,
            snapshots,
            bus,
            state: Arc::new(ComponentState::new()),
            default_market_type: default_market_type.into(),
            default_position_size_pct,
        }
    }
}

const NAME: &str = "decision_engine";

#[async_trait]
impl EventHandler for DecisionEngine {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let (exchange, symbol) = match &event.payload {
            EventPayload::AnalyticsUpdated { exchange, symbol } => (exchange.clone(), symbol.clone()),
            _ => return Ok(()),
        };

        self.state.record_activity();

        let snapshot = match self.snapshots.get_snapshot(&exchange, &symbol).await {
            Some(snapshot) => snapshot,
            None => {
                warn!(exchange = %exchange, symbol = %symbol, "no snapshot available for analytics update");
                return Ok(());
            }
        };

        if let Some(signal) = self
            .pipeline
            .evaluate(
                &snapshot,
                &exchange,
                &self.default_market_type,
                self.default_position_size_pct,
            )
            .await
        {
            self.bus
                .publish(EventPayload::SignalGenerated { signal })
                .await;
        }

        Ok(())
    }
}

#[async_trait]
impl Component for DecisionEngine {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        self.state.set_running(true);
        self.bus
            .subscribe(EventKind::AnalyticsUpdated, self.clone())
            .await;
        Ok(())
    }

    async fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        self.bus.unsubscribe(EventKind::AnalyticsUpdated, NAME).await;
        self.state.set_running(false);
        Ok(())
    }

    fn health(&self) -> ComponentHealth {
        self.state.health(NAME)
    }
}
