use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Exchange-reported order status, distinct from the engine's own
/// `OrderState` machine (`application::execution::order_manager`) which is
/// the authoritative in-process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl fmt::Display for ExchangeOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ===== Symbol Normalization =====

/// Supported quote currencies for crypto pairs, ordered by priority (longest first to prefer USDT over USD)
const CRYPTO_QUOTE_CURRENCIES: &[&str] = &[
    "USDT", "USDC", "BUSD", "TUSD", // Stablecoins (4 chars)
    "USD", "EUR", "GBP", "BTC", "ETH", // Traditional (3 chars)
];

/// Normalizes a crypto symbol from exchange wire format to application format.
///
/// Exchanges typically return crypto symbols without slashes (e.g., "BTCUSDT"),
/// but the application uses slash-separated format (e.g., "BTC/USDT").
///
/// # Examples
/// ```
/// use rustrade::domain::trading::types::normalize_crypto_symbol;
///
/// assert_eq!(normalize_crypto_symbol("BTCUSD").unwrap(), "BTC/USD");
/// assert_eq!(normalize_crypto_symbol("BTCUSDT").unwrap(), "BTC/USDT");
/// assert_eq!(normalize_crypto_symbol("ETHEUR").unwrap(), "ETH/EUR");
/// assert_eq!(normalize_crypto_symbol("BTC/USD").unwrap(), "BTC/USD"); // Already normalized
/// ```
pub fn normalize_crypto_symbol(symbol: &str) -> Result<String, String> {
    if symbol.contains('/') {
        return Ok(symbol.to_string());
    }

    if symbol.is_empty() {
        return Err("Cannot normalize empty symbol".to_string());
    }

    for quote in CRYPTO_QUOTE_CURRENCIES {
        if symbol.ends_with(quote) && symbol.len() > quote.len() {
            let base = &symbol[..symbol.len() - quote.len()];
            if !base.is_empty() && base.chars().all(|c| c.is_ascii_uppercase()) {
                return Ok(format!("{}/{}", base, quote));
            }
        }
    }

    Err(format!(
        "Cannot normalize crypto symbol: '{}' - no recognized quote currency",
        symbol
    ))
}

/// Denormalizes a crypto symbol from application format back to exchange wire format.
///
/// # Examples
/// ```
/// use rustrade::domain::trading::types::denormalize_crypto_symbol;
///
/// assert_eq!(denormalize_crypto_symbol("BTC/USD"), "BTCUSD");
/// assert_eq!(denormalize_crypto_symbol("ETH/USDT"), "ETHUSDT");
/// assert_eq!(denormalize_crypto_symbol("BTCUSD"), "BTCUSD"); // Already denormalized
/// ```
pub fn denormalize_crypto_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denormalize_crypto_symbol() {
        assert_eq!(denormalize_crypto_symbol("BTC/USD"), "BTCUSD");
        assert_eq!(denormalize_crypto_symbol("ETH/USDT"), "ETHUSDT");
        assert_eq!(denormalize_crypto_symbol("AVAX/USD"), "AVAXUSD");
        assert_eq!(denormalize_crypto_symbol("LINK/EUR"), "LINKEUR");
        assert_eq!(denormalize_crypto_symbol("BTCUSD"), "BTCUSD");
    }

    #[test]
    fn test_normalize_denormalize_roundtrip() {
        let symbols = vec!["BTCUSD", "ETHUSDT", "AVAXUSD", "LINKEUR"];
        for symbol in symbols {
            let normalized = normalize_crypto_symbol(symbol).unwrap();
            let denormalized = denormalize_crypto_symbol(&normalized);
            assert_eq!(denormalized, symbol);
        }
    }

    #[test]
    fn test_normalize_crypto_stablecoins() {
        assert_eq!(normalize_crypto_symbol("BTCUSDT").unwrap(), "BTC/USDT");
        assert_eq!(normalize_crypto_symbol("ETHUSDC").unwrap(), "ETH/USDC");
        assert_eq!(normalize_crypto_symbol("BNBBUSD").unwrap(), "BNB/BUSD");
    }

    #[test]
    fn test_normalize_crypto_prefers_longer_quote() {
        assert_eq!(normalize_crypto_symbol("BTCUSDT").unwrap(), "BTC/USDT");
    }

    #[test]
    fn test_normalize_crypto_invalid_symbols() {
        assert!(normalize_crypto_symbol("INVALID").is_err());
        assert!(normalize_crypto_symbol("").is_err());
    }

    #[test]
    fn test_normalize_crypto_case_sensitivity() {
        assert!(normalize_crypto_symbol("btcusd").is_err());
        assert!(normalize_crypto_symbol("BtcUsd").is_err());
    }
}
