use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::events::{EventKind, Severity};

/// Notification urgency tier, aliased 1:1 to `EventKind::severity()`.
/// Grounded on `notifications/priority.py`'s `NotificationPriority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationPriority {
    Critical,
    Warning,
    Info,
}

impl From<Severity> for NotificationPriority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => NotificationPriority::Critical,
            Severity::Warning => NotificationPriority::Warning,
            Severity::Info => NotificationPriority::Info,
        }
    }
}

impl NotificationPriority {
    pub fn of(kind: EventKind) -> Self {
        kind.severity().into()
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationPriority::Critical => "critical",
            NotificationPriority::Warning => "warning",
            NotificationPriority::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityConfig {
    pub send_immediately: bool,
    pub batch_interval: Duration,
    pub max_retries: u32,
}

impl PriorityConfig {
    pub fn for_priority(priority: NotificationPriority) -> Self {
        match priority {
            NotificationPriority::Critical => PriorityConfig {
                send_immediately: true,
                batch_interval: Duration::ZERO,
                max_retries: 3,
            },
            NotificationPriority::Warning => PriorityConfig {
                send_immediately: false,
                batch_interval: Duration::from_secs(300),
                max_retries: 2,
            },
            NotificationPriority::Info => PriorityConfig {
                send_immediately: false,
                batch_interval: Duration::from_secs(600),
                max_retries: 0,
            },
        }
    }
}

/// One queued entry awaiting a batch flush.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub notification_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-hour sliding-window rate limiter keyed by notification type.
/// Grounded on `PriorityHandler.is_rate_limited`.
#[derive(Default)]
pub struct RateLimiter {
    hits: HashMap<String, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hit and returns whether this hit exceeds `max_per_hour`.
    /// A suppressed hit is still counted (it is not added again), matching
    /// the original's "track then check" ordering.
    pub fn check_and_record(&mut self, notification_type: &str, max_per_hour: usize) -> bool {
        let now = Utc::now();
        let one_hour_ago = now - chrono::Duration::hours(1);
        let window = self.hits.entry(notification_type.to_string()).or_default();
        while let Some(front) = window.front() {
            if *front <= one_hour_ago {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= max_per_hour {
            return true;
        }

        window.push_back(now);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_matches_event_severity() {
        assert_eq!(
            NotificationPriority::of(EventKind::OrderFailed),
            NotificationPriority::Critical
        );
        assert_eq!(
            NotificationPriority::of(EventKind::DumpDetected),
            NotificationPriority::Warning
        );
        assert_eq!(
            NotificationPriority::of(EventKind::OrderFilled),
            NotificationPriority::Info
        );
    }

    #[test]
    fn rate_limiter_suppresses_after_max_per_hour() {
        let mut limiter = RateLimiter::new();
        assert!(!limiter.check_and_record("order_failed", 2));
        assert!(!limiter.check_and_record("order_failed", 2));
        assert!(limiter.check_and_record("order_failed", 2));
    }
}
