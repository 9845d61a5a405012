use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::execution::context::{ExecutionContext, HandlerOutcome};
use crate::application::execution::order_manager::OrderManager;
use crate::application::execution::pipeline::ExecutionPipeline;
use crate::application::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::domain::events::{Event, EventKind, EventPayload};
use crate::domain::trading::order::OrderState;
use crate::domain::trading::types::OrderType;
use crate::infrastructure::event_bus::{EventBus, EventHandler};

/// Reactive component: subscribes to `SignalGenerated`, runs the signal
/// through the handler chain, updates the order manager, and publishes the
/// resulting lifecycle events. Grounded on `execution/executor.py`'s
/// `ExecutionEngine.on_signal` closing paragraph.
pub struct ExecutionEngine {
    pipeline: ExecutionPipeline,
    orders: Arc<OrderManager>,
    bus: EventBus,
    state: Arc<ComponentState>,
    default_order_type: OrderType,
}

impl ExecutionEngine {
    pub fn new(
        pipeline: ExecutionPipeline,
        orders: Arc<OrderManager>,
        bus: EventBus,
        default_order_type: OrderType,
    ) -> Self {
        Self {
            pipeline,
            orders,
            bus,
            state: Arc::new(ComponentState::new()),
            default_order_type,
        }
    }
}

const NAME: &str = "execution_engine";

#[async_trait]
impl EventHandler for ExecutionEngine {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let signal = match &event.payload {
            EventPayload::SignalGenerated { signal } => signal.clone(),
            _ => return Ok(()),
        };

        self.state.record_activity();

        let client_order_id = format!("sig-{}", Uuid::new_v4());
        let mut ctx = ExecutionContext::new(signal.clone(), client_order_id.clone());
        ctx.order_type = self.default_order_type;

        self.orders
            .create_order(
                client_order_id.clone(),
                signal.symbol.clone(),
                signal.side,
                self.default_order_type,
                ctx.quantity.unwrap_or_default(),
                None,
                signal.exchange.clone(),
                signal.market_type.clone(),
                Some(client_order_id.clone()),
            )
            .await;

        match self.pipeline.run(&mut ctx).await {
            Ok(()) => self.handle_success(&client_order_id, &ctx).await,
            Err(reason) => self.handle_failure(&client_order_id, &ctx, &reason).await,
        }

        Ok(())
    }
}

impl ExecutionEngine {
    async fn handle_success(&self, client_order_id: &str, ctx: &ExecutionContext) {
        let exchange_order_id = ctx.exchange_order_id.clone();
        if let Some(exchange_order_id) = &exchange_order_id {
            self.orders
                .update_submitted(client_order_id, exchange_order_id.clone())
                .await;
        }

        self.bus
            .publish(EventPayload::OrderPlaced {
                client_order_id: client_order_id.to_string(),
                exchange_order_id: exchange_order_id.clone(),
                symbol: ctx.signal.symbol.clone(),
                side: ctx.signal.side,
                quantity: ctx.quantity.unwrap_or_default(),
                price: ctx.price,
            })
            .await;

        let (Some(filled), Some(avg_fill_price)) = (ctx.filled_quantity, ctx.avg_fill_price) else {
            info!(client_order_id, "order placed with no confirmed fill yet");
            return;
        };

        let requested = ctx.quantity.unwrap_or(filled);
        let is_partial = filled < requested;

        self.orders
            .update_filled(
                client_order_id,
                filled,
                avg_fill_price,
                ctx.commission.unwrap_or_default(),
                "USDT",
                is_partial,
            )
            .await;

        self.bus
            .publish(EventPayload::OrderFilled {
                client_order_id: client_order_id.to_string(),
                symbol: ctx.signal.symbol.clone(),
                filled_quantity: filled,
                avg_fill_price,
            })
            .await;

        if is_partial {
            return;
        }

        self.bus
            .publish(EventPayload::PositionOpened {
                position_id: format!("pos-{}", Uuid::new_v4()),
                symbol: ctx.signal.symbol.clone(),
                exchange: ctx.signal.exchange.clone(),
                market_type: ctx.signal.market_type.clone(),
                side: ctx.signal.side,
                entry_price: avg_fill_price,
                quantity: filled,
                stop_loss: ctx.stop_loss_price,
                take_profit: ctx.take_profit_price,
                trailing_stop_distance_pct: None,
                signal_id: Some(client_order_id.to_string()),
                order_id: ctx.exchange_order_id.clone().unwrap_or_default(),
            })
            .await;
    }

    async fn handle_failure(&self, client_order_id: &str, ctx: &ExecutionContext, reason: &str) {
        warn!(client_order_id, reason, "execution pipeline rejected signal");

        let rejected_before_submission = ctx.exchange_order_id.is_none();
        self.orders
            .update_failed(client_order_id, reason.to_string(), rejected_before_submission)
            .await;

        let handler_log: Vec<String> = ctx
            .handler_log
            .iter()
            .map(|entry| {
                format!(
                    "{}:{}:{}",
                    entry.handler,
                    if entry.outcome == HandlerOutcome::Success { "ok" } else { "fail" },
                    entry.message
                )
            })
            .collect();

        self.bus
            .publish(EventPayload::OrderFailed {
                client_order_id: client_order_id.to_string(),
                symbol: ctx.signal.symbol.clone(),
                error: format!("{reason} [{}]", handler_log.join("; ")),
            })
            .await;
    }
}

#[async_trait]
impl Component for ExecutionEngine {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        self.state.set_running(true);
        self.bus
            .subscribe(EventKind::SignalGenerated, self.clone())
            .await;
        Ok(())
    }

    async fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        self.bus.unsubscribe(EventKind::SignalGenerated, NAME).await;
        self.state.set_running(false);
        Ok(())
    }

    fn health(&self) -> ComponentHealth {
        self.state.health(NAME)
    }
}

impl ExecutionEngine {
    pub fn order_manager(&self) -> &Arc<OrderManager> {
        &self.orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::execution::pipeline::ExecutionHandler;
    use crate::application::execution::context::ExecutionOutcome;
    use crate::domain::trading::signal::{ConfidenceTag, TradeSignal};
    use crate::domain::trading::types::OrderSide;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingHandler {
        order_kinds: Arc<Mutex<Vec<EventKind>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn handle(&self, event: &Event) -> anyhow::Result<()> {
            self.order_kinds.lock().unwrap().push(event.kind());
            Ok(())
        }
    }

    struct AlwaysSucceed;
    #[async_trait]
    impl ExecutionHandler for AlwaysSucceed {
        fn name(&self) -> &str {
            "succeed"
        }
        async fn process(&self, ctx: &mut ExecutionContext) -> ExecutionOutcome {
            ctx.quantity = Some(Decimal::new(1, 0));
            ctx.price = Some(Decimal::new(100, 0));
            ctx.exchange_order_id = Some("ex1".into());
            ctx.filled_quantity = Some(Decimal::new(1, 0));
            ctx.avg_fill_price = Some(Decimal::new(100, 0));
            ctx.order_state = OrderState::Filled;
            ExecutionOutcome::Success
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl ExecutionHandler for AlwaysFail {
        fn name(&self) -> &str {
            "fail"
        }
        async fn process(&self, _ctx: &mut ExecutionContext) -> ExecutionOutcome {
            ExecutionOutcome::Failure("rejected by test handler".into())
        }
    }

    fn signal() -> TradeSignal {
        TradeSignal {
            symbol: "BTC/USDT".into(),
            side: OrderSide::Buy,
            confluence_score: Decimal::new(4, 0),
            primary_signals: vec![],
            filter_scores: Default::default(),
            entry_price: Decimal::new(100, 0),
            timestamp: chrono::Utc::now(),
            confidence: ConfidenceTag::VeryHigh,
            exchange: "binance".into(),
            market_type: "spot".into(),
            position_size_pct: Decimal::new(2, 0),
            stop_loss: None,
            take_profit: None,
        }
    }

    #[tokio::test]
    async fn success_publishes_full_lifecycle() {
        let bus = EventBus::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventKind::OrderPlaced, Arc::new(RecordingHandler { order_kinds: kinds.clone() })).await;
        bus.subscribe(EventKind::OrderFilled, Arc::new(RecordingHandler { order_kinds: kinds.clone() })).await;
        bus.subscribe(EventKind::PositionOpened, Arc::new(RecordingHandler { order_kinds: kinds.clone() })).await;

        let pipeline = ExecutionPipeline::new(vec![Box::new(AlwaysSucceed)]);
        let engine = ExecutionEngine::new(pipeline, Arc::new(OrderManager::new(10)), bus.clone(), OrderType::Market);

        let event = Event {
            sequence: 0,
            timestamp: chrono::Utc::now(),
            payload: EventPayload::SignalGenerated { signal: signal() },
        };
        engine.handle(&event).await.unwrap();

        for _ in 0..50 {
            if kinds.lock().unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let recorded = kinds.lock().unwrap().clone();
        assert!(recorded.contains(&EventKind::OrderPlaced));
        assert!(recorded.contains(&EventKind::OrderFilled));
        assert!(recorded.contains(&EventKind::PositionOpened));
    }

    #[tokio::test]
    async fn failure_publishes_order_failed_with_handler_log() {
        let bus = EventBus::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        struct CountingRecorder {
            kinds: Arc<Mutex<Vec<EventKind>>>,
            count: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl EventHandler for CountingRecorder {
            fn name(&self) -> &str {
                "counting_recorder"
            }
            async fn handle(&self, event: &Event) -> anyhow::Result<()> {
                self.kinds.lock().unwrap().push(event.kind());
                self.count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        bus.subscribe(
            EventKind::OrderFailed,
            Arc::new(CountingRecorder { kinds: kinds.clone(), count: count.clone() }),
        )
        .await;

        let pipeline = ExecutionPipeline::new(vec![Box::new(AlwaysFail)]);
        let engine = ExecutionEngine::new(pipeline, Arc::new(OrderManager::new(10)), bus, OrderType::Market);

        let event = Event {
            sequence: 0,
            timestamp: chrono::Utc::now(),
            payload: EventPayload::SignalGenerated { signal: signal() },
        };
        engine.handle(&event).await.unwrap();

        for _ in 0..50 {
            if count.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(kinds.lock().unwrap().as_slice(), &[EventKind::OrderFailed]);

        let history = engine.order_manager().order_history(None, 10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, OrderState::Rejected);
    }
}
