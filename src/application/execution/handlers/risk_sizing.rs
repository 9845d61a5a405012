use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::application::execution::context::{ExecutionContext, ExecutionOutcome};
use crate::application::execution::pipeline::ExecutionHandler;
use crate::domain::ports::{BalanceProvider, PositionCountProvider};
use crate::domain::trading::types::OrderSide;

/// Queries balance and open-position count, computes quantity and stop
/// loss, enforces the sizing limits. Grounded on
/// `execution/handlers/risk_manager.py`'s `RiskManagementHandler`.
pub struct RiskSizingHandler {
    pub max_concurrent_positions: usize,
    pub default_position_size_pct: Decimal,
    pub max_position_size_pct: Decimal,
    pub min_risk_reward_ratio: Decimal,
    pub max_stop_loss_distance_pct: Decimal,
    pub balance_asset: String,
    balances: Arc<dyn BalanceProvider>,
    positions: Arc<dyn PositionCountProvider>,
}

impl RiskSizingHandler {
    pub fn new(
        max_concurrent_positions: usize,
        default_position_size_pct: Decimal,
        max_position_size_pct: Decimal,
        min_risk_reward_ratio: Decimal,
        max_stop_loss_distance_pct: Decimal,
        balance_asset: impl Into<String>,
        balances: Arc<dyn BalanceProvider>,
        positions: Arc<dyn PositionCountProvider>,
    ) -> Self {
        Self {
            max_concurrent_positions,
            default_position_size_pct,
            max_position_size_pct,
            min_risk_reward_ratio,
            max_stop_loss_distance_pct,
            balance_asset: balance_asset.into(),
            balances,
            positions,
        }
    }

    fn default_stop_loss(side: OrderSide, entry_price: Decimal, distance_pct: Decimal) -> Decimal {
        let factor = distance_pct / Decimal::from(100);
        match side {
            OrderSide::Buy => entry_price * (Decimal::ONE - factor),
            OrderSide::Sell => entry_price * (Decimal::ONE + factor),
        }
    }

    fn risk_reward_ratio(entry_price: Decimal, stop_loss: Decimal, take_profit: Decimal) -> Decimal {
        let risk = (entry_price - stop_loss).abs();
        let reward = (take_profit - entry_price).abs();
        if risk.is_zero() {
            Decimal::ZERO
        } else {
            reward / risk
        }
    }
}

#[async_trait]
impl ExecutionHandler for RiskSizingHandler {
    fn name(&self) -> &str {
        "risk_sizing"
    }

    async fn process(&self, ctx: &mut ExecutionContext) -> ExecutionOutcome {
        let open_positions = self.positions.open_position_count(None).await;
        if open_positions >= self.max_concurrent_positions {
            return ExecutionOutcome::Failure(format!(
                "maximum concurrent positions ({}) reached",
                self.max_concurrent_positions
            ));
        }

        let balance = match self
            .balances
            .get_balance(&ctx.signal.exchange, &self.balance_asset)
            .await
        {
            Ok(balance) if balance > Decimal::ZERO => balance,
            Ok(_) => {
                return ExecutionOutcome::Failure("account balance is zero".into());
            }
            Err(err) => {
                return ExecutionOutcome::Failure(format!("unable to determine account balance: {err}"));
            }
        };

        let mut position_size_pct = if ctx.signal.position_size_pct > Decimal::ZERO {
            ctx.signal.position_size_pct
        } else {
            self.default_position_size_pct
        };
        if position_size_pct > self.max_position_size_pct {
            tracing::warn!(
                requested = %position_size_pct,
                max = %self.max_position_size_pct,
                "position size exceeds max, clamping"
            );
            position_size_pct = self.max_position_size_pct;
        }

        let position_size_usd = balance * (position_size_pct / Decimal::from(100));
        let entry_price = ctx.signal.entry_price;
        let quantity = position_size_usd / entry_price;

        let stop_loss = match ctx.signal.stop_loss {
            Some(stop_loss) => {
                let distance_pct = ((entry_price - stop_loss) / entry_price * Decimal::from(100)).abs();
                if distance_pct > self.max_stop_loss_distance_pct {
                    return ExecutionOutcome::Failure(format!(
                        "stop loss distance {distance_pct}% exceeds max {}%",
                        self.max_stop_loss_distance_pct
                    ));
                }
                stop_loss
            }
            None => Self::default_stop_loss(ctx.signal.side, entry_price, self.max_stop_loss_distance_pct),
        };

        if let Some(take_profit) = ctx.signal.take_profit {
            let ratio = Self::risk_reward_ratio(entry_price, stop_loss, take_profit);
            if ratio < self.min_risk_reward_ratio {
                return ExecutionOutcome::Failure(format!(
                    "risk/reward ratio {ratio} below minimum {}",
                    self.min_risk_reward_ratio
                ));
            }
        }

        ctx.position_size_usd = Some(position_size_usd);
        ctx.quantity = Some(quantity);
        ctx.price = Some(entry_price);
        ctx.stop_loss_price = Some(stop_loss);
        ctx.take_profit_price = ctx.signal.take_profit;

        ExecutionOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBalance(Decimal);

    #[async_trait]
    impl BalanceProvider for FixedBalance {
        async fn get_balance(&self, _exchange: &str, _asset: &str) -> anyhow::Result<Decimal> {
            Ok(self.0)
        }
    }

    struct FixedPositionCount(usize);

    #[async_trait]
    impl PositionCountProvider for FixedPositionCount {
        async fn open_position_count(&self, _symbol: Option<&str>) -> usize {
            self.0
        }
    }

    fn signal(stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> crate::domain::trading::signal::TradeSignal {
        crate::domain::trading::signal::TradeSignal {
            symbol: "BTC/USDT".into(),
            side: OrderSide::Buy,
            confluence_score: Decimal::new(4, 0),
            primary_signals: vec![],
            filter_scores: std::collections::HashMap::new(),
            entry_price: Decimal::new(100, 0),
            timestamp: chrono::Utc::now(),
            confidence: crate::domain::trading::signal::ConfidenceTag::VeryHigh,
            exchange: "binance".into(),
            market_type: "spot".into(),
            position_size_pct: Decimal::new(2, 0),
            stop_loss,
            take_profit,
        }
    }

    #[tokio::test]
    async fn synthesizes_stop_loss_when_absent() {
        let handler = RiskSizingHandler::new(
            3,
            Decimal::new(2, 0),
            Decimal::new(5, 0),
            Decimal::new(15, 1),
            Decimal::new(2, 0),
            "USDT",
            Arc::new(FixedBalance(Decimal::new(10000, 0))),
            Arc::new(FixedPositionCount(0)),
        );
        let mut ctx = ExecutionContext::new(signal(None, None), "c1".into());
        let outcome = handler.process(&mut ctx).await;
        assert!(matches!(outcome, ExecutionOutcome::Success));
        assert_eq!(ctx.stop_loss_price, Some(Decimal::new(98, 0)));
        assert_eq!(ctx.quantity, Some(Decimal::new(2, 0)));
    }

    #[tokio::test]
    async fn rejects_when_max_concurrent_positions_reached() {
        let handler = RiskSizingHandler::new(
            1,
            Decimal::new(2, 0),
            Decimal::new(5, 0),
            Decimal::new(15, 1),
            Decimal::new(2, 0),
            "USDT",
            Arc::new(FixedBalance(Decimal::new(10000, 0))),
            Arc::new(FixedPositionCount(1)),
        );
        let mut ctx = ExecutionContext::new(signal(None, None), "c1".into());
        assert!(matches!(
            handler.process(&mut ctx).await,
            ExecutionOutcome::Failure(_)
        ));
    }

    #[tokio::test]
    async fn rejects_when_risk_reward_below_minimum() {
        let handler = RiskSizingHandler::new(
            3,
            Decimal::new(2, 0),
            Decimal::new(5, 0),
            Decimal::new(2, 0),
            Decimal::new(2, 0),
            "USDT",
            Arc::new(FixedBalance(Decimal::new(10000, 0))),
            Arc::new(FixedPositionCount(0)),
        );
        let mut ctx = ExecutionContext::new(
            signal(Some(Decimal::new(98, 0)), Some(Decimal::new(101, 0))),
            "c1".into(),
        );
        assert!(matches!(
            handler.process(&mut ctx).await,
            ExecutionOutcome::Failure(_)
        ));
    }
}
