use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::application::execution::context::{ExecutionContext, ExecutionOutcome};
use crate::application::execution::pipeline::ExecutionHandler;
use crate::domain::ports::{ExchangeAdapter, OrderRef};
use crate::domain::trading::types::ExchangeOrderStatus;

/// Polls the exchange for fill confirmation and flags slippage/partial
/// fills. Grounded on `execution/handlers/reconciler.py`'s
/// `ReconciliationHandler`.
pub struct ReconciliationHandler {
    pub verify_fill: bool,
    pub max_price_slippage_pct: Decimal,
    pub poll_interval: Duration,
    pub max_wait_time: Duration,
    pub min_fill_ratio: Decimal,
    exchange: Arc<dyn ExchangeAdapter>,
}

impl ReconciliationHandler {
    pub fn new(
        verify_fill: bool,
        max_price_slippage_pct: Decimal,
        poll_interval: Duration,
        max_wait_time: Duration,
        min_fill_ratio: Decimal,
        exchange: Arc<dyn ExchangeAdapter>,
    ) -> Self {
        Self {
            verify_fill,
            max_price_slippage_pct,
            poll_interval,
            max_wait_time,
            min_fill_ratio,
            exchange,
        }
    }

    async fn verify_order_fill(&self, ctx: &mut ExecutionContext) -> bool {
        let order_id = match &ctx.exchange_order_id {
            Some(id) => id.clone(),
            None => return false,
        };

        let mut elapsed = Duration::ZERO;
        while elapsed < self.max_wait_time {
            let order_info = match self
                .exchange
                .get_order(&ctx.signal.symbol, OrderRef::ExchangeId(order_id.clone()))
                .await
            {
                Ok(info) => info,
                Err(err) => {
                    warn!(error = %err, "error verifying order fill");
                    return false;
                }
            };

            match order_info.status {
                ExchangeOrderStatus::Filled => {
                    ctx.filled_quantity = Some(order_info.filled_quantity);
                    ctx.avg_fill_price = order_info.avg_fill_price;
                    return true;
                }
                ExchangeOrderStatus::Rejected | ExchangeOrderStatus::Cancelled | ExchangeOrderStatus::Expired => {
                    return false;
                }
                _ => {}
            }

            tokio::time::sleep(self.poll_interval).await;
            elapsed += self.poll_interval;
        }

        warn!(order_id = %order_id, "order fill verification timed out");
        false
    }
}

#[async_trait]
impl ExecutionHandler for ReconciliationHandler {
    fn name(&self) -> &str {
        "reconciliation"
    }

    async fn process(&self, ctx: &mut ExecutionContext) -> ExecutionOutcome {
        if ctx.exchange_order_id.is_none() {
            return ExecutionOutcome::Failure("no order id to reconcile".into());
        }

        if self.verify_fill && !self.verify_order_fill(ctx).await {
            return ExecutionOutcome::Failure("order fill verification failed".into());
        }

        if let (Some(avg_fill_price), Some(expected_price)) = (ctx.avg_fill_price, ctx.price) {
            let slippage_pct = ((avg_fill_price - expected_price).abs() / expected_price) * Decimal::from(100);
            if slippage_pct > self.max_price_slippage_pct {
                warn!(slippage_pct = %slippage_pct, "high price slippage detected");
                ctx.high_slippage = true;
                ctx.slippage_pct = Some(slippage_pct);
            }
        }

        if let (Some(filled), Some(requested)) = (ctx.filled_quantity, ctx.quantity) {
            if !requested.is_zero() {
                let fill_ratio = filled / requested;
                if fill_ratio < self.min_fill_ratio {
                    warn!(fill_ratio = %fill_ratio, "partial fill detected");
                    ctx.partial_fill = true;
                    ctx.fill_ratio = Some(fill_ratio);
                }
            }
        }

        info!(
            order_id = ?ctx.exchange_order_id,
            filled = ?ctx.filled_quantity,
            requested = ?ctx.quantity,
            "reconciliation completed"
        );

        ExecutionOutcome::Success
    }
}
