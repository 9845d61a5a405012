use thiserror::Error;

/// Errors surfaced by an exchange adapter. Callers must be able to distinguish
/// each variant to decide retry behavior; all other implementation failures are
/// wrapped into `Exchange`.
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("exchange error: {0}")]
    Exchange(String),
}

impl ExchangeError {
    /// Whether the order-placement handler should retry this failure.
    ///
    /// Mirrors the source executor's substring classification: insufficient
    /// balance and invalid-order are never retried; rate limits always are;
    /// a generic exchange error falls back to pattern matching on its message,
    /// defaulting to retriable when the message gives no signal either way.
    pub fn is_retriable(&self) -> bool {
        match self {
            ExchangeError::RateLimit(_) => true,
            ExchangeError::InsufficientBalance(_) => false,
            ExchangeError::InvalidOrder(_) => false,
            ExchangeError::OrderNotFound(_) => false,
            ExchangeError::Exchange(msg) => {
                let lower = msg.to_lowercase();
                const NON_RETRIABLE: &[&str] = &[
                    "insufficient",
                    "invalid",
                    "unauthorized",
                    "forbidden",
                    "not found",
                    "bad request",
                ];
                const RETRIABLE: &[&str] = &[
                    "timeout",
                    "connection",
                    "network",
                    "temporarily",
                    "try again",
                    "service unavailable",
                ];
                if NON_RETRIABLE.iter().any(|p| lower.contains(p)) {
                    false
                } else if RETRIABLE.iter().any(|p| lower.contains(p)) {
                    true
                } else {
                    true // conservative: assume retriable
                }
            }
        }
    }
}

/// Errors from the per-pair storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("pair not found: {0}")]
    NotFound(String),
}

/// Errors from the notification router's send path.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification send failed: {0}")]
    SendFailed(String),
}

/// Configuration errors, raised only during bootstrap (Fatal-startup).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_always_retriable() {
        assert!(ExchangeError::RateLimit("too many requests".into()).is_retriable());
    }

    #[test]
    fn insufficient_balance_never_retriable() {
        assert!(!ExchangeError::InsufficientBalance("need 10 USDT".into()).is_retriable());
    }

    #[test]
    fn invalid_order_never_retriable() {
        assert!(!ExchangeError::InvalidOrder("quantity below minimum".into()).is_retriable());
    }

    #[test]
    fn generic_error_classified_by_message() {
        assert!(!ExchangeError::Exchange("401 Unauthorized".into()).is_retriable());
        assert!(ExchangeError::Exchange("connection reset by peer".into()).is_retriable());
        assert!(ExchangeError::Exchange("something unexpected".into()).is_retriable());
    }
}
