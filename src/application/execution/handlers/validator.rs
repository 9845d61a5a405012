use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::application::execution::context::{ExecutionContext, ExecutionOutcome};
use crate::application::execution::pipeline::ExecutionHandler;
use crate::domain::trading::types::OrderSide;

/// Rejects malformed signals before anything is sized or submitted.
/// Grounded on `execution/handlers/validator.py`'s `ValidationHandler`.
pub struct ValidationHandler {
    pub min_signal_strength: Decimal,
    pub min_confluence_score: Decimal,
    pub max_confluence_score: Decimal,
    pub valid_exchanges: Vec<String>,
}

impl ValidationHandler {
    pub fn new(
        min_confluence_score: Decimal,
        max_confluence_score: Decimal,
        valid_exchanges: Vec<String>,
    ) -> Self {
        Self {
            min_signal_strength: Decimal::ZERO,
            min_confluence_score,
            max_confluence_score,
            valid_exchanges,
        }
    }

    fn is_valid_symbol(symbol: &str) -> bool {
        let stripped: String = symbol
            .chars()
            .filter(|c| !matches!(c, '-' | '/' | '_'))
            .collect();
        stripped.len() >= 3 && stripped.chars().all(|c| c.is_ascii_alphanumeric())
    }

    fn validate_stop_loss(side: OrderSide, entry: Decimal, stop: Option<Decimal>) -> bool {
        match stop {
            None => true,
            Some(stop) => match side {
                OrderSide::Buy => stop < entry,
                OrderSide::Sell => stop > entry,
            },
        }
    }

    fn validate_take_profit(side: OrderSide, entry: Decimal, take_profit: Option<Decimal>) -> bool {
        match take_profit {
            None => true,
            Some(tp) => match side {
                OrderSide::Buy => tp > entry,
                OrderSide::Sell => tp < entry,
            },
        }
    }
}

#[async_trait]
impl ExecutionHandler for ValidationHandler {
    fn name(&self) -> &str {
        "validation"
    }

    async fn process(&self, ctx: &mut ExecutionContext) -> ExecutionOutcome {
        let signal = &ctx.signal;

        if signal.confluence_score < self.min_confluence_score {
            return ExecutionOutcome::Failure(format!(
                "confluence score {} below minimum {}",
                signal.confluence_score, self.min_confluence_score
            ));
        }

        if signal.confluence_score > self.max_confluence_score {
            tracing::warn!(
                score = %signal.confluence_score,
                max = %self.max_confluence_score,
                "confluence score exceeds configured maximum"
            );
        }

        if !self
            .valid_exchanges
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&signal.exchange))
        {
            return ExecutionOutcome::Failure(format!(
                "exchange {} not in configured whitelist",
                signal.exchange
            ));
        }

        if !Self::is_valid_symbol(&signal.symbol) {
            return ExecutionOutcome::Failure(format!("symbol {} is malformed", signal.symbol));
        }

        if signal.position_size_pct <= Decimal::ZERO || signal.position_size_pct > Decimal::from(100) {
            return ExecutionOutcome::Failure(format!(
                "position size {} outside (0, 100]",
                signal.position_size_pct
            ));
        }

        if !Self::validate_stop_loss(signal.side, signal.entry_price, signal.stop_loss) {
            return ExecutionOutcome::Failure("stop loss on wrong side of entry".into());
        }

        if !Self::validate_take_profit(signal.side, signal.entry_price, signal.take_profit) {
            return ExecutionOutcome::Failure("take profit on wrong side of entry".into());
        }

        ExecutionOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ValidationHandler {
        ValidationHandler::new(
            Decimal::new(3, 0),
            Decimal::new(10, 0),
            vec!["binance".into(), "bybit".into()],
        )
    }

    #[test]
    fn valid_symbol_accepts_alphanumeric_after_stripping_separators() {
        assert!(ValidationHandler::is_valid_symbol("BTC-USDT"));
        assert!(ValidationHandler::is_valid_symbol("BTC/USDT"));
        assert!(!ValidationHandler::is_valid_symbol("B$"));
    }

    #[test]
    fn stop_loss_must_be_below_entry_for_buy() {
        assert!(ValidationHandler::validate_stop_loss(
            OrderSide::Buy,
            Decimal::new(100, 0),
            Some(Decimal::new(90, 0))
        ));
        assert!(!ValidationHandler::validate_stop_loss(
            OrderSide::Buy,
            Decimal::new(100, 0),
            Some(Decimal::new(110, 0))
        ));
    }

    #[test]
    fn take_profit_must_be_above_entry_for_buy() {
        assert!(ValidationHandler::validate_take_profit(
            OrderSide::Buy,
            Decimal::new(100, 0),
            Some(Decimal::new(110, 0))
        ));
        assert!(!ValidationHandler::validate_take_profit(
            OrderSide::Buy,
            Decimal::new(100, 0),
            Some(Decimal::new(90, 0))
        ));
    }

    #[test]
    fn missing_stop_or_take_profit_is_valid() {
        assert!(ValidationHandler::validate_stop_loss(
            OrderSide::Buy,
            Decimal::new(100, 0),
            None
        ));
        assert!(ValidationHandler::validate_take_profit(
            OrderSide::Sell,
            Decimal::new(100, 0),
            None
        ));
    }

    fn signal(position_size_pct: Decimal) -> crate::domain::trading::signal::TradeSignal {
        crate::domain::trading::signal::TradeSignal {
            symbol: "BTC/USDT".into(),
            side: OrderSide::Buy,
            confluence_score: Decimal::new(4, 0),
            primary_signals: vec![],
            filter_scores: std::collections::HashMap::new(),
            entry_price: Decimal::new(50000, 0),
            timestamp: chrono::Utc::now(),
            confidence: crate::domain::trading::signal::ConfidenceTag::VeryHigh,
            exchange: "binance".into(),
            market_type: "spot".into(),
            position_size_pct,
            stop_loss: None,
            take_profit: None,
        }
    }

    #[tokio::test]
    async fn position_size_boundaries_zero_and_over_hundred_are_rejected() {
        let h = handler();

        let mut ctx = ExecutionContext::new(signal(Decimal::ZERO), "c1".into());
        assert!(matches!(h.process(&mut ctx).await, ExecutionOutcome::Failure(_)));

        let mut ctx = ExecutionContext::new(signal(Decimal::new(1000001, 4)), "c2".into());
        assert!(matches!(h.process(&mut ctx).await, ExecutionOutcome::Failure(_)));

        let mut ctx = ExecutionContext::new(signal(Decimal::new(100, 0)), "c3".into());
        assert!(matches!(h.process(&mut ctx).await, ExecutionOutcome::Success));
    }
}
