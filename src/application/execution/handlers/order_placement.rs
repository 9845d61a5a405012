use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::application::execution::context::{ExecutionContext, ExecutionOutcome};
use crate::application::execution::pipeline::ExecutionHandler;
use crate::domain::errors::ExchangeError;
use crate::domain::ports::{ExchangeAdapter, PlaceOrderRequest};
use crate::domain::trading::order::OrderState;

/// Submits the order via the exchange adapter with capped exponential
/// backoff retry. Grounded on
/// `execution/handlers/executor.py`'s `OrderExecutorHandler`.
pub struct OrderPlacementHandler {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    exchange: Arc<dyn ExchangeAdapter>,
}

impl OrderPlacementHandler {
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        jitter: bool,
        exchange: Arc<dyn ExchangeAdapter>,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_factor,
            jitter,
            exchange,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let mut delay = (base * self.backoff_factor.powi(attempt as i32 - 1)).min(self.max_delay.as_secs_f64());

        if self.jitter {
            let jitter_range = delay * 0.25;
            let offset = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            delay += offset;
        }

        Duration::from_secs_f64(delay.max(0.1))
    }
}

#[async_trait]
impl ExecutionHandler for OrderPlacementHandler {
    fn name(&self) -> &str {
        "order_placement"
    }

    async fn process(&self, ctx: &mut ExecutionContext) -> ExecutionOutcome {
        let quantity = match ctx.quantity {
            Some(q) => q,
            None => return ExecutionOutcome::Failure("no quantity computed by risk sizing".into()),
        };

        let mut attempt: u32 = 0;
        let mut filled_so_far = Decimal::ZERO;
        let mut commission_so_far = Decimal::ZERO;
        loop {
            let remaining = residual_quantity(quantity, filled_so_far);

            let request = PlaceOrderRequest {
                symbol: ctx.signal.symbol.clone(),
                side: ctx.signal.side,
                order_type: ctx.order_type,
                quantity: remaining,
                price: ctx.price,
                stop_price: ctx.stop_loss_price,
                client_order_id: Some(ctx.client_order_id.clone()),
                time_in_force: "GTC".to_string(),
            };

            info!(
                attempt = attempt + 1,
                max = self.max_retries + 1,
                symbol = %ctx.signal.symbol,
                side = %ctx.signal.side,
                quantity = %remaining,
                "submitting order"
            );

            match self.exchange.place_order(request).await {
                Ok(order_info) => {
                    filled_so_far += order_info.filled_quantity;
                    commission_so_far += order_info.commission;

                    ctx.exchange_order_id = Some(order_info.order_id.clone());
                    ctx.filled_quantity = Some(filled_so_far);
                    ctx.avg_fill_price = order_info.avg_fill_price.or(ctx.avg_fill_price);
                    ctx.commission = Some(commission_so_far);
                    ctx.retry_count = attempt;
                    ctx.order_state = OrderState::Submitted;

                    let still_residual = residual_quantity(quantity, filled_so_far) > Decimal::ZERO;
                    if order_info.status == crate::domain::trading::types::ExchangeOrderStatus::PartiallyFilled
                        && still_residual
                        && attempt < self.max_retries
                    {
                        attempt += 1;
                        warn!(
                            attempt,
                            filled = %filled_so_far,
                            residual = %residual_quantity(quantity, filled_so_far),
                            "order partially filled, resubmitting residual quantity"
                        );
                        continue;
                    }

                    return ExecutionOutcome::Success;
                }
                Err(err) => {
                    if !err.is_retriable() {
                        return ExecutionOutcome::Failure(format!("non-retriable exchange error: {err}"));
                    }

                    attempt += 1;
                    if attempt > self.max_retries {
                        return ExecutionOutcome::Failure(format!(
                            "exchange error after {attempt} attempts: {err}"
                        ));
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(attempt, delay_ms = delay.as_millis(), error = %err, "retrying order placement");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Quantity still unfilled after `already_filled` units of `original` have
/// been executed across prior attempts. Used to resubmit only the residual
/// amount instead of the full original quantity on a partial-fill retry.
pub fn residual_quantity(original: Decimal, already_filled: Decimal) -> Decimal {
    (original - already_filled).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residual_quantity_subtracts_filled_amount() {
        assert_eq!(
            residual_quantity(Decimal::new(10, 0), Decimal::new(4, 0)),
            Decimal::new(6, 0)
        );
    }

    #[test]
    fn residual_quantity_never_negative() {
        assert_eq!(
            residual_quantity(Decimal::new(4, 0), Decimal::new(10, 0)),
            Decimal::ZERO
        );
    }

    struct FlakyExchange {
        fail_times: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ExchangeAdapter for FlakyExchange {
        async fn connect(&self) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn place_order(
            &self,
            _request: PlaceOrderRequest,
        ) -> Result<crate::domain::ports::OrderInfo, ExchangeError> {
            let remaining = self.fail_times.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            if remaining > 0 {
                return Err(ExchangeError::RateLimit("throttled".into()));
            }
            Ok(crate::domain::ports::OrderInfo {
                order_id: "ex1".into(),
                client_order_id: Some("c1".into()),
                symbol: "BTC/USDT".into(),
                side: crate::domain::trading::types::OrderSide::Buy,
                order_type: crate::domain::trading::types::OrderType::Market,
                status: crate::domain::trading::types::ExchangeOrderStatus::Filled,
                price: None,
                quantity: Decimal::new(1, 0),
                filled_quantity: Decimal::new(1, 0),
                avg_fill_price: Some(Decimal::new(100, 0)),
                commission: Decimal::ZERO,
                commission_asset: "USDT".into(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
        }
        async fn cancel_order(
            &self,
            _symbol: &str,
            _order_ref: crate::domain::ports::OrderRef,
        ) -> Result<bool, ExchangeError> {
            Ok(true)
        }
        async fn get_order(
            &self,
            _symbol: &str,
            _order_ref: crate::domain::ports::OrderRef,
        ) -> Result<crate::domain::ports::OrderInfo, ExchangeError> {
            unimplemented!()
        }
        async fn get_balance(
            &self,
            _asset: Option<&str>,
        ) -> Result<std::collections::HashMap<String, crate::domain::ports::Balance>, ExchangeError> {
            Ok(Default::default())
        }
        async fn get_positions(
            &self,
            _symbol: Option<&str>,
        ) -> Result<Vec<crate::domain::ports::ExchangePosition>, ExchangeError> {
            Ok(vec![])
        }
        async fn get_ticker(&self, _symbol: &str) -> Result<crate::domain::ports::Ticker, ExchangeError> {
            unimplemented!()
        }
        async fn get_symbol_info(
            &self,
            _symbol: &str,
        ) -> Result<crate::domain::ports::SymbolInfo, ExchangeError> {
            unimplemented!()
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn exchange_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let handler = OrderPlacementHandler::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
            false,
            Arc::new(FlakyExchange {
                fail_times: std::sync::atomic::AtomicU32::new(2),
            }),
        );

        let mut ctx = ExecutionContext::new(
            crate::domain::trading::signal::TradeSignal {
                symbol: "BTC/USDT".into(),
                side: crate::domain::trading::types::OrderSide::Buy,
                confluence_score: Decimal::new(4, 0),
                primary_signals: vec![],
                filter_scores: std::collections::HashMap::new(),
                entry_price: Decimal::new(100, 0),
                timestamp: chrono::Utc::now(),
                confidence: crate::domain::trading::signal::ConfidenceTag::VeryHigh,
                exchange: "binance".into(),
                market_type: "spot".into(),
                position_size_pct: Decimal::new(2, 0),
                stop_loss: None,
                take_profit: None,
            },
            "c1".into(),
        );
        ctx.quantity = Some(Decimal::new(1, 0));

        let outcome = handler.process(&mut ctx).await;
        assert!(matches!(outcome, ExecutionOutcome::Success));
        assert_eq!(ctx.retry_count, 2);
    }
}
