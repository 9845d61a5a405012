use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::ExchangeError;
use crate::domain::ports::{
    Balance, ExchangeAdapter, ExchangePosition, OrderInfo, OrderRef, PlaceOrderRequest,
    SymbolInfo, Ticker,
};
use crate::domain::trading::types::ExchangeOrderStatus;
use crate::infrastructure::observability::{LatencyGuard, Metrics};

/// Deterministic in-memory exchange adapter for paper trading and tests.
/// Fills every order immediately at the requested price (or a synthetic
/// mid-price for market orders). Grounded on `infrastructure/mock.rs`'s
/// execution/market-data stand-ins.
pub struct MockExchangeAdapter {
    connected: AtomicBool,
    sequence: AtomicU64,
    orders: RwLock<HashMap<String, OrderInfo>>,
    client_index: RwLock<HashMap<String, String>>,
    prices: RwLock<HashMap<String, Decimal>>,
    metrics: Option<Metrics>,
}

impl MockExchangeAdapter {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            orders: RwLock::new(HashMap::new()),
            client_index: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn latency_guard(&self, operation: &str) -> Option<LatencyGuard> {
        self.metrics
            .as_ref()
            .map(|m| LatencyGuard::new(m.exchange_latency_seconds.with_label_values(&["mock", operation])))
    }

    /// Resolves an `OrderRef` to the exchange-assigned order id this adapter
    /// keys `orders` by, looking up `client_index` for `OrderRef::ClientId`.
    async fn resolve_order_id(&self, order_ref: &OrderRef) -> Option<String> {
        match order_ref {
            OrderRef::ExchangeId(id) => Some(id.clone()),
            OrderRef::ClientId(id) => self.client_index.read().await.get(id).cloned(),
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    async fn mid_price(&self, symbol: &str) -> Decimal {
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::new(100, 0))
    }
}

impl Default for MockExchangeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchangeAdapter {
    async fn connect(&self) -> Result<(), ExchangeError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    #[instrument(skip(self, request), fields(symbol = %request.symbol, side = ?request.side))]
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderInfo, ExchangeError> {
        let _guard = self.latency_guard("place_order");
        if request.quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder("quantity must be positive".into()));
        }

        let fill_price = request.price.unwrap_or(self.mid_price(&request.symbol).await);
        let order_id = format!("mock-{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();

        let order = OrderInfo {
            order_id: order_id.clone(),
            client_order_id: request.client_order_id.or_else(|| Some(format!("c-{}", Uuid::new_v4()))),
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            status: ExchangeOrderStatus::Filled,
            price: request.price,
            quantity: request.quantity,
            filled_quantity: request.quantity,
            avg_fill_price: Some(fill_price),
            commission: request.quantity * fill_price * Decimal::new(1, 3), // 10 bps
            commission_asset: "USDT".to_string(),
            created_at: now,
            updated_at: now,
        };

        if let Some(client_order_id) = &order.client_order_id {
            self.client_index.write().await.insert(client_order_id.clone(), order_id.clone());
        }
        self.orders.write().await.insert(order_id, order.clone());
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, _symbol: &str, order_ref: OrderRef) -> Result<bool, ExchangeError> {
        let _guard = self.latency_guard("cancel_order");
        let Some(order_id) = self.resolve_order_id(&order_ref).await else {
            return Ok(false);
        };
        let removed = self.orders.write().await.remove(&order_id);
        if let Some(order) = &removed {
            if let Some(client_order_id) = &order.client_order_id {
                self.client_index.write().await.remove(client_order_id);
            }
        }
        Ok(removed.is_some())
    }

    #[instrument(skip(self))]
    async fn get_order(&self, _symbol: &str, order_ref: OrderRef) -> Result<OrderInfo, ExchangeError> {
        let _guard = self.latency_guard("get_order");
        let not_found = || match &order_ref {
            OrderRef::ExchangeId(id) => ExchangeError::OrderNotFound(id.clone()),
            OrderRef::ClientId(id) => ExchangeError::OrderNotFound(id.clone()),
        };
        let Some(order_id) = self.resolve_order_id(&order_ref).await else {
            return Err(not_found());
        };
        self.orders.read().await.get(&order_id).cloned().ok_or_else(not_found)
    }

    async fn get_balance(&self, asset: Option<&str>) -> Result<HashMap<String, Balance>, ExchangeError> {
        let mut balances = HashMap::new();
        let asset = asset.unwrap_or("USDT").to_string();
        balances.insert(
            asset.clone(),
            Balance {
                asset,
                free: Decimal::new(100_000, 0),
                locked: Decimal::ZERO,
                total: Decimal::new(100_000, 0),
            },
        );
        Ok(balances)
    }

    async fn get_positions(&self, _symbol: Option<&str>) -> Result<Vec<ExchangePosition>, ExchangeError> {
        Ok(Vec::new())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let last = self.mid_price(symbol).await;
        Ok(Ticker {
            symbol: symbol.to_string(),
            bid: last * Decimal::new(9995, 4),
            ask: last * Decimal::new(10005, 4),
            last,
        })
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExchangeError> {
        Ok(SymbolInfo {
            symbol: symbol.to_string(),
            min_quantity: Decimal::new(1, 4),
            price_precision: 2,
            quantity_precision: 6,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn exchange_name(&self) -> &str {
        "mock"
    }
}
