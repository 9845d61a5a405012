//! Binance REST adapter implementing `ExchangeAdapter`. Grounded on
//! `infrastructure/binance.rs`'s `BinanceExecutionService`: HMAC-SHA256
//! query signing, `X-MBX-APIKEY` auth header, and the `/api/v3/order`,
//! `/api/v3/account`, `/api/v3/ticker` REST surface.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use sha2::Sha256;
use tracing::instrument;

use crate::domain::errors::ExchangeError;
use crate::domain::ports::{
    Balance, ExchangeAdapter, ExchangePosition, OrderInfo, OrderRef, PlaceOrderRequest,
    SymbolInfo, Ticker,
};
use crate::domain::trading::types::{ExchangeOrderStatus, OrderSide, OrderType};
use crate::infrastructure::observability::{LatencyGuard, Metrics};

type HmacSha256 = Hmac<Sha256>;

pub struct BinanceAdapter {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    connected: std::sync::atomic::AtomicBool,
    metrics: Option<Metrics>,
}

impl BinanceAdapter {
    pub fn new(api_key: String, api_secret: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_secret,
            base_url,
            connected: std::sync::atomic::AtomicBool::new(false),
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
            .map(|m| LatencyGuard::new(m.exchange_latency_seconds.with_label_values(&["binance", operation])))
    }

    fn sign(&self, query_string: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let mut query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if !query_string.is_empty() {
            query_string.push('&');
        }
        query_string.push_str(&format!("timestamp={timestamp}"));
        let signature = self.sign(&query_string);
        format!("{query_string}&signature={signature}")
    }

    fn api_symbol(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    async fn request_error(response: reqwest::Response) -> ExchangeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 {
            ExchangeError::RateLimit(body)
        } else if status.as_u16() == 400 && body.contains("insufficient") {
            ExchangeError::InsufficientBalance(body)
        } else {
            ExchangeError::Exchange(format!("{status}: {body}"))
        }
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), ExchangeError> {
        let url = format!("{}/api/v3/ping", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;
        self.connected.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        self.connected.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    #[instrument(skip(self, request), fields(symbol = %request.symbol, side = ?request.side))]
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderInfo, ExchangeError> {
        let _guard = self.latency_guard("place_order");
        if request.quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder("quantity must be positive".into()));
        }

        let api_symbol = Self::api_symbol(&request.symbol);
        let side = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match request.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::Stop => "STOP_LOSS",
            OrderType::StopLimit => "STOP_LOSS_LIMIT",
        };

        let mut params = vec![
            ("symbol", api_symbol),
            ("side", side.to_string()),
            ("type", order_type.to_string()),
            ("quantity", request.quantity.to_string()),
        ];
        if let Some(price) = request.price {
            params.push(("price", price.to_string()));
            params.push(("timeInForce", request.time_in_force.clone()));
        }
        if let Some(client_id) = &request.client_order_id {
            params.push(("newClientOrderId", client_id.clone()));
        }

        let signed = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{signed}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::request_error(response).await);
        }

        #[derive(Deserialize)]
        struct OrderResponse {
            #[serde(rename = "orderId")]
            order_id: i64,
            #[serde(rename = "clientOrderId")]
            client_order_id: String,
            status: String,
            #[serde(rename = "executedQty")]
            executed_qty: String,
            #[serde(rename = "cummulativeQuoteQty")]
            cumulative_quote_qty: String,
        }

        let parsed: OrderResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        let filled_quantity =
            parsed.executed_qty.parse::<f64>().ok().and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO);
        let quote_qty = parsed
            .cumulative_quote_qty
            .parse::<f64>()
            .ok()
            .and_then(Decimal::from_f64)
            .unwrap_or(Decimal::ZERO);
        let avg_fill_price = if filled_quantity > Decimal::ZERO {
            Some(quote_qty / filled_quantity)
        } else {
            None
        };

        let now = Utc::now();
        Ok(OrderInfo {
            order_id: parsed.order_id.to_string(),
            client_order_id: Some(parsed.client_order_id),
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            status: parse_status(&parsed.status),
            price: request.price,
            quantity: request.quantity,
            filled_quantity,
            avg_fill_price,
            commission: Decimal::ZERO,
            commission_asset: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, symbol: &str, order_ref: OrderRef) -> Result<bool, ExchangeError> {
        let _guard = self.latency_guard("cancel_order");
        let mut params = vec![("symbol", Self::api_symbol(symbol))];
        match order_ref {
            OrderRef::ExchangeId(id) => params.push(("orderId", id)),
            OrderRef::ClientId(id) => params.push(("origClientOrderId", id)),
        }
        let signed = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{signed}", self.base_url);

        let response = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Self::request_error(response).await);
        }
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn get_order(&self, symbol: &str, order_ref: OrderRef) -> Result<OrderInfo, ExchangeError> {
        let _guard = self.latency_guard("get_order");
        let mut params = vec![("symbol", Self::api_symbol(symbol))];
        let id_for_error = match &order_ref {
            OrderRef::ExchangeId(id) => id.clone(),
            OrderRef::ClientId(id) => id.clone(),
        };
        match order_ref {
            OrderRef::ExchangeId(id) => params.push(("orderId", id)),
            OrderRef::ClientId(id) => params.push(("origClientOrderId", id)),
        }
        let signed = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{signed}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Err(ExchangeError::OrderNotFound(id_for_error));
        }
        if !response.status().is_success() {
            return Err(Self::request_error(response).await);
        }

        #[derive(Deserialize)]
        struct OrderResponse {
            #[serde(rename = "orderId")]
            order_id: i64,
            #[serde(rename = "clientOrderId")]
            client_order_id: String,
            side: String,
            #[serde(rename = "type")]
            order_type: String,
            status: String,
            price: String,
            #[serde(rename = "origQty")]
            orig_qty: String,
            #[serde(rename = "executedQty")]
            executed_qty: String,
        }

        let parsed: OrderResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        let now = Utc::now();
        Ok(OrderInfo {
            order_id: parsed.order_id.to_string(),
            client_order_id: Some(parsed.client_order_id),
            symbol: symbol.to_string(),
            side: if parsed.side == "BUY" { OrderSide::Buy } else { OrderSide::Sell },
            order_type: match parsed.order_type.as_str() {
                "LIMIT" => OrderType::Limit,
                "STOP_LOSS" => OrderType::Stop,
                "STOP_LOSS_LIMIT" => OrderType::StopLimit,
                _ => OrderType::Market,
            },
            status: parse_status(&parsed.status),
            price: parsed.price.parse::<f64>().ok().and_then(Decimal::from_f64),
            quantity: parsed.orig_qty.parse::<f64>().ok().and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO),
            filled_quantity: parsed
                .executed_qty
                .parse::<f64>()
                .ok()
                .and_then(Decimal::from_f64)
                .unwrap_or(Decimal::ZERO),
            avg_fill_price: None,
            commission: Decimal::ZERO,
            commission_asset: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_balance(&self, asset: Option<&str>) -> Result<HashMap<String, Balance>, ExchangeError> {
        let signed = self.signed_query(&[]);
        let url = format!("{}/api/v3/account?{signed}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::request_error(response).await);
        }

        #[derive(Deserialize)]
        struct RawBalance {
            asset: String,
            free: String,
            locked: String,
        }
        #[derive(Deserialize)]
        struct Account {
            balances: Vec<RawBalance>,
        }

        let account: Account = response
            .json()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        let mut balances = HashMap::new();
        for raw in account.balances {
            if let Some(wanted) = asset {
                if raw.asset != wanted {
                    continue;
                }
            }
            let free = raw.free.parse::<f64>().ok().and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO);
            let locked = raw.locked.parse::<f64>().ok().and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO);
            if asset.is_none() && free.is_zero() && locked.is_zero() {
                continue;
            }
            balances.insert(
                raw.asset.clone(),
                Balance { asset: raw.asset, free, locked, total: free + locked },
            );
        }
        Ok(balances)
    }

    async fn get_positions(&self, _symbol: Option<&str>) -> Result<Vec<ExchangePosition>, ExchangeError> {
        // Binance spot has no margin positions; futures support is out of scope.
        Ok(Vec::new())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let url = format!("{}/api/v3/ticker/bookTicker?symbol={}", self.base_url, Self::api_symbol(symbol));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::request_error(response).await);
        }

        #[derive(Deserialize)]
        struct RawTicker {
            #[serde(rename = "bidPrice")]
            bid_price: String,
            #[serde(rename = "askPrice")]
            ask_price: String,
        }
        let raw: RawTicker = response
            .json()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        let bid = raw.bid_price.parse::<f64>().ok().and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO);
        let ask = raw.ask_price.parse::<f64>().ok().and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO);
        Ok(Ticker { symbol: symbol.to_string(), bid, ask, last: (bid + ask) / Decimal::new(2, 0) })
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExchangeError> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, Self::api_symbol(symbol));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::request_error(response).await);
        }

        #[derive(Deserialize)]
        struct Filter {
            #[serde(rename = "filterType")]
            filter_type: String,
            #[serde(rename = "minQty")]
            min_qty: Option<String>,
        }
        #[derive(Deserialize)]
        struct RawSymbol {
            #[serde(rename = "quotePrecision")]
            quote_precision: u32,
            #[serde(rename = "baseAssetPrecision")]
            base_asset_precision: u32,
            filters: Vec<Filter>,
        }
        #[derive(Deserialize)]
        struct ExchangeInfo {
            symbols: Vec<RawSymbol>,
        }

        let info: ExchangeInfo = response
            .json()
            .await
            .map_err(|e| ExchangeError::Exchange(e.to_string()))?;
        let raw = info
            .symbols
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::Exchange(format!("unknown symbol {symbol}")))?;

        let min_quantity = raw
            .filters
            .iter()
            .find(|f| f.filter_type == "LOT_SIZE")
            .and_then(|f| f.min_qty.as_ref())
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(Decimal::from_f64)
            .unwrap_or_else(|| Decimal::new(1, 4));

        Ok(SymbolInfo {
            symbol: symbol.to_string(),
            min_quantity,
            price_precision: raw.quote_precision,
            quantity_precision: raw.base_asset_precision,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn exchange_name(&self) -> &str {
        "binance"
    }
}

fn parse_status(status: &str) -> ExchangeOrderStatus {
    match status {
        "NEW" => ExchangeOrderStatus::New,
        "PARTIALLY_FILLED" => ExchangeOrderStatus::PartiallyFilled,
        "FILLED" => ExchangeOrderStatus::Filled,
        "CANCELED" | "CANCELLED" => ExchangeOrderStatus::Cancelled,
        "REJECTED" => ExchangeOrderStatus::Rejected,
        "EXPIRED" => ExchangeOrderStatus::Expired,
        _ => ExchangeOrderStatus::New,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_hex() {
        let adapter = BinanceAdapter::new("key".into(), "secret".into(), "https://api.binance.com".into());
        let sig1 = adapter.sign("symbol=BTCUSDT&side=BUY&quantity=1&timestamp=1234567890");
        let sig2 = adapter.sign("symbol=BTCUSDT&side=BUY&quantity=1&timestamp=1234567890");
        assert_eq!(sig1, sig2);
        assert!(sig1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn api_symbol_strips_slash() {
        assert_eq!(BinanceAdapter::api_symbol("BTC/USDT"), "BTCUSDT");
    }

    #[test]
    fn status_codes_map_to_known_variants() {
        assert_eq!(parse_status("FILLED"), ExchangeOrderStatus::Filled);
        assert_eq!(parse_status("CANCELED"), ExchangeOrderStatus::Cancelled);
        assert_eq!(parse_status("PARTIALLY_FILLED"), ExchangeOrderStatus::PartiallyFilled);
    }
}
