use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::errors::ExchangeError;
use crate::domain::trading::types::{ExchangeOrderStatus, OrderSide, OrderType};

/// Identifies an order either by the exchange's own id or by the locally
/// generated client id.
#[derive(Debug, Clone)]
pub enum OrderRef {
    ExchangeId(String),
    ClientId(String),
}

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub client_order_id: Option<String>,
    pub time_in_force: String,
}

#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: ExchangeOrderStatus,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub commission: Decimal,
    pub commission_asset: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: Decimal,
}

#[derive(Debug, Clone)]
pub struct Ticker {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
}

#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub symbol: String,
    pub min_quantity: Decimal,
    pub price_precision: u32,
    pub quantity_precision: u32,
}

/// Uniform façade over a specific exchange's order and account APIs.
/// Grounded on `original_source/src/execution/exchanges/base.py`.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), ExchangeError>;
    async fn disconnect(&self) -> Result<(), ExchangeError>;

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderInfo, ExchangeError>;
    async fn cancel_order(&self, symbol: &str, order_ref: OrderRef) -> Result<bool, ExchangeError>;
    async fn get_order(&self, symbol: &str, order_ref: OrderRef) -> Result<OrderInfo, ExchangeError>;

    async fn get_balance(
        &self,
        asset: Option<&str>,
    ) -> Result<HashMap<String, Balance>, ExchangeError>;
    async fn get_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError>;

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;
    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExchangeError>;

    fn is_connected(&self) -> bool;
    fn exchange_name(&self) -> &str;
}

/// Injected into the risk/sizing handler; queries account balance for a
/// given exchange and asset.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn get_balance(&self, exchange: &str, asset: &str) -> anyhow::Result<Decimal>;
}

/// Injected into the risk/sizing handler; queries the count of currently
/// open positions, optionally scoped to one symbol.
#[async_trait]
pub trait PositionCountProvider: Send + Sync {
    async fn open_position_count(&self, symbol: Option<&str>) -> usize;
}

/// Black-box email/SMS/webhook sender the notification router dispatches to.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Looks up the latest cached analytics snapshot for a pair; the decision
/// engine calls this after an `AnalyticsUpdated` event names the pair whose
/// snapshot changed.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn get_snapshot(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Option<crate::domain::snapshot::AnalyticsSnapshot>;
}
