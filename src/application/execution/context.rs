use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::trading::order::OrderState;
use crate::domain::trading::signal::TradeSignal;
use crate::domain::trading::types::OrderType;

/// One entry in a handler's execution log, preserved on the context for
/// diagnostics and published verbatim on `OrderFailed`.
#[derive(Debug, Clone)]
pub struct HandlerLogEntry {
    pub handler: String,
    pub outcome: HandlerOutcome,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Success,
    Failure,
}

/// Mutable state threaded through the execution chain. Each handler reads
/// fields set by earlier handlers and writes its own.
/// Grounded on `execution/handlers/base.py`'s `ExecutionContext`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub signal: TradeSignal,

    pub client_order_id: String,
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,

    pub position_size_usd: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,

    pub order_state: OrderState,
    pub exchange_order_id: Option<String>,
    pub filled_quantity: Option<Decimal>,
    pub avg_fill_price: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub retry_count: u32,

    pub high_slippage: bool,
    pub slippage_pct: Option<Decimal>,
    pub partial_fill: bool,
    pub fill_ratio: Option<Decimal>,

    pub handler_log: Vec<HandlerLogEntry>,
}

impl ExecutionContext {
    pub fn new(signal: TradeSignal, client_order_id: String) -> Self {
        Self {
            signal,
            client_order_id,
            order_type: OrderType::Limit,
            quantity: None,
            price: None,
            position_size_usd: None,
            stop_loss_price: None,
            take_profit_price: None,
            order_state: OrderState::Pending,
            exchange_order_id: None,
            filled_quantity: None,
            avg_fill_price: None,
            commission: None,
            retry_count: 0,
            high_slippage: false,
            slippage_pct: None,
            partial_fill: false,
            fill_ratio: None,
            handler_log: Vec::new(),
        }
    }

    pub fn log(&mut self, handler: &str, outcome: HandlerOutcome, message: impl Into<String>) {
        self.handler_log.push(HandlerLogEntry {
            handler: handler.to_string(),
            outcome,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}

/// Terminal outcome of a handler's `process` call; `Failure` short-circuits
/// the remainder of the chain.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success,
    Failure(String),
}
