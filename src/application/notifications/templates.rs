use crate::application::notifications::priority::{BatchEntry, NotificationPriority};
use crate::domain::events::{Event, EventPayload};

/// Maps a routed event to a `(notification_type, message)` pair. Grounded on
/// the per-handler message formatting in `notifications/service.py`, folded
/// into one dispatch function since Rust's event payload is a single enum
/// rather than one Python dataclass per handler.
pub fn describe(event: &Event) -> (&'static str, String) {
    match &event.payload {
        EventPayload::OrderFailed { symbol, error, .. } => {
            ("OrderFailed", format!("{symbol}: {error}"))
        }
        EventPayload::SystemError { component, error } => {
            ("SystemError", format!("{component}: {error}"))
        }
        EventPayload::MarketDataConnectionLost { exchange } => {
            ("MarketDataConnectionLost", format!("lost connection to {exchange}"))
        }
        EventPayload::CircuitBreakerTriggered { name } => {
            ("CircuitBreakerTriggered", format!("circuit breaker tripped: {name}"))
        }
        EventPayload::ForceExitRequired { position_id, reason } => (
            "ForceExitRequired",
            format!("position {position_id}: {reason}"),
        ),
        EventPayload::DataQualityIssue { symbol, description } => {
            ("DataQualityIssue", format!("{symbol}: {description}"))
        }
        EventPayload::PortfolioHealthDegraded { description } => {
            ("PortfolioHealthDegraded", description.clone())
        }
        EventPayload::DumpDetected { symbol, magnitude_pct } => {
            ("DumpDetected", format!("{symbol}: {magnitude_pct}% drop"))
        }
        EventPayload::CorrelatedDumpDetected { symbols, magnitude_pct } => (
            "CorrelatedDumpDetected",
            format!("{} symbols dumped {magnitude_pct}%: {}", symbols.len(), symbols.join(", ")),
        ),
        EventPayload::MaxHoldTimeExceeded { position_id, held_seconds } => (
            "MaxHoldTimeExceeded",
            format!("position {position_id} held {}min", held_seconds / 60),
        ),
        EventPayload::SignalGenerated { signal } => (
            "SignalGenerated",
            format!(
                "{} {} @ {} (confluence {})",
                signal.side, signal.symbol, signal.entry_price, signal.confluence_score
            ),
        ),
        EventPayload::PositionOpened {
            symbol,
            side,
            entry_price,
            quantity,
            ..
        } => (
            "PositionOpened",
            format!("{side} {symbol} @ {entry_price} (qty {quantity})"),
        ),
        EventPayload::PositionClosed {
            symbol,
            exit_price,
            realized_pnl,
            reason,
            ..
        } => (
            "PositionClosed",
            format!("{symbol}: pnl {realized_pnl} @ {exit_price} ({reason})"),
        ),
        EventPayload::OrderFilled {
            symbol,
            filled_quantity,
            avg_fill_price,
            ..
        } => (
            "OrderFilled",
            format!("{symbol}: {filled_quantity} @ {avg_fill_price}"),
        ),
        EventPayload::TrailingStopHit { symbol, stop_price, .. } => {
            ("TrailingStopHit", format!("{symbol}: stop triggered @ {stop_price}"))
        }
        _ => ("Unrouted", "event not mapped to a notification template".to_string()),
    }
}

pub fn immediate_subject(notification_type: &str) -> String {
    format!("[ALERT] {notification_type}")
}

pub fn batch_subject(priority: NotificationPriority, count: usize) -> String {
    format!("[{}] {count} events", priority.label().to_uppercase())
}

/// Aggregates batched entries by notification type into one summary body.
pub fn batch_body(entries: &[BatchEntry]) -> String {
    let mut grouped: Vec<(String, Vec<&BatchEntry>)> = Vec::new();
    for entry in entries {
        match grouped.iter_mut().find(|(kind, _)| *kind == entry.notification_type) {
            Some((_, bucket)) => bucket.push(entry),
            None => grouped.push((entry.notification_type.clone(), vec![entry])),
        }
    }

    let mut lines = Vec::new();
    for (kind, bucket) in grouped {
        lines.push(format!("{kind} ({}):", bucket.len()));
        for entry in bucket {
            lines.push(format!("  - {}", entry.message));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn batch_body_groups_by_notification_type() {
        let entries = vec![
            BatchEntry {
                notification_type: "DumpDetected".into(),
                message: "BTC/USDT: 12%".into(),
                timestamp: Utc::now(),
            },
            BatchEntry {
                notification_type: "DumpDetected".into(),
                message: "ETH/USDT: 9%".into(),
                timestamp: Utc::now(),
            },
            BatchEntry {
                notification_type: "PortfolioHealthDegraded".into(),
                message: "score 40".into(),
                timestamp: Utc::now(),
            },
        ];
        let body = batch_body(&entries);
        assert!(body.contains("DumpDetected (2):"));
        assert!(body.contains("PortfolioHealthDegraded (1):"));
    }
}
