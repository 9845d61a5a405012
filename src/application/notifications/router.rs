use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::application::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::application::notifications::priority::{BatchEntry, NotificationPriority, PriorityConfig, RateLimiter};
use crate::application::notifications::templates;
use crate::domain::events::{Event, EventKind, EventPayload};
use crate::domain::ports::NotificationSender;
use crate::infrastructure::event_bus::{EventBus, EventHandler};
use crate::infrastructure::observability::Metrics;

/// Event kinds routed to notifications. Excludes high-frequency/internal
/// kinds (ticks, candles, analytics refreshes, notification echoes) to avoid
/// feedback loops, matching the explicit subscribe list in
/// `notifications/service.py`'s `NotificationSystem.start`.
pub const ROUTED_KINDS: &[EventKind] = &[
    EventKind::OrderFailed,
    EventKind::SystemError,
    EventKind::MarketDataConnectionLost,
    EventKind::CircuitBreakerTriggered,
    EventKind::ForceExitRequired,
    EventKind::DataQualityIssue,
    EventKind::PortfolioHealthDegraded,
    EventKind::DumpDetected,
    EventKind::CorrelatedDumpDetected,
    EventKind::MaxHoldTimeExceeded,
    EventKind::SignalGenerated,
    EventKind::PositionOpened,
    EventKind::PositionClosed,
    EventKind::OrderFilled,
    EventKind::TrailingStopHit,
];

const MAX_PER_HOUR: usize = 10;
const FLUSH_POLL_INTERVAL: Duration = Duration::from_secs(10);

struct RouterState {
    rate_limiter: RateLimiter,
    batches: HashMap<NotificationPriority, Vec<BatchEntry>>,
    last_flush: HashMap<NotificationPriority, chrono::DateTime<Utc>>,
}

/// Routes lifecycle/warning/error events to an email-style sender per
/// priority tier: CRITICAL sends immediately with retries, WARNING/INFO
/// batch and flush on an interval. Grounded on
/// `notifications/service.py`'s `NotificationSystem` and
/// `notifications/priority.py`'s `PriorityHandler`.
const NAME: &str = "notification_router";

pub struct NotificationRouter {
    sender: Arc<dyn NotificationSender>,
    bus: EventBus,
    state: Arc<ComponentState>,
    configs: HashMap<NotificationPriority, PriorityConfig>,
    inner: Mutex<RouterState>,
    background: Mutex<Option<tokio::task::JoinHandle<()>>>,
    metrics: Option<Metrics>,
}

impl NotificationRouter {
    pub fn new(sender: Arc<dyn NotificationSender>, bus: EventBus) -> Self {
        let mut configs = HashMap::new();
        for priority in [
            NotificationPriority::Critical,
            NotificationPriority::Warning,
            NotificationPriority::Info,
        ] {
            configs.insert(priority, PriorityConfig::for_priority(priority));
        }

        let now = Utc::now();
        Self {
            sender,
            bus,
            state: Arc::new(ComponentState::new()),
            configs,
            inner: Mutex::new(RouterState {
                rate_limiter: RateLimiter::new(),
                batches: HashMap::from([
                    (NotificationPriority::Warning, Vec::new()),
                    (NotificationPriority::Info, Vec::new()),
                ]),
                last_flush: HashMap::from([
                    (NotificationPriority::Warning, now),
                    (NotificationPriority::Info, now),
                ]),
            }),
            background: Mutex::new(None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn send_with_retry(&self, subject: &str, body: &str, max_retries: u32) -> bool {
        for attempt in 0..=max_retries {
            match self.sender.send(subject, body).await {
                Ok(()) => return true,
                Err(err) => {
                    warn!(attempt, error = %err, "notification send attempt failed");
                }
            }
        }
        false
    }

    async fn route(&self, event: &Event) {
        let kind = event.kind();
        let priority = NotificationPriority::of(kind);
        let (notification_type, message) = templates::describe(event);

        let suppressed = {
            let mut inner = self.inner.lock().await;
            inner.rate_limiter.check_and_record(notification_type, MAX_PER_HOUR)
        };
        if suppressed {
            warn!(notification_type, "notification suppressed by rate limit");
            if let Some(metrics) = &self.metrics {
                metrics.record_notification_suppressed(priority.label());
            }
            return;
        }

        let config = self.configs[&priority];
        if config.send_immediately {
            let subject = templates::immediate_subject(notification_type);
            if self.send_with_retry(&subject, &message, config.max_retries).await {
                if let Some(metrics) = &self.metrics {
                    metrics.record_notification_sent(priority.label());
                }
                self.bus
                    .publish(EventPayload::NotificationSent {
                        notification_type: notification_type.to_string(),
                    })
                    .await;
            } else {
                error!(notification_type, "notification failed after retries");
                if let Some(metrics) = &self.metrics {
                    metrics.record_notification_failed(priority.label());
                }
                self.bus
                    .publish(EventPayload::NotificationFailed {
                        notification_type: notification_type.to_string(),
                        error: "exhausted retries".into(),
                    })
                    .await;
            }
            return;
        }

        let mut inner = self.inner.lock().await;
        inner
            .batches
            .entry(priority)
            .or_default()
            .push(BatchEntry {
                notification_type: notification_type.to_string(),
                message,
                timestamp: Utc::now(),
            });
    }

    async fn flush_due_batches(&self) {
        for priority in [NotificationPriority::Warning, NotificationPriority::Info] {
            let due_batch = {
                let mut inner = self.inner.lock().await;
                let config = self.configs[&priority];
                let last_flush = *inner.last_flush.get(&priority).unwrap();
                let due = Utc::now().signed_duration_since(last_flush).to_std().unwrap_or(Duration::ZERO)
                    >= config.batch_interval;
                let entries = inner.batches.get(&priority).map(|b| b.len()).unwrap_or(0);
                if due && entries > 0 {
                    inner.last_flush.insert(priority, Utc::now());
                    inner.batches.insert(priority, Vec::new())
                } else {
                    None
                }
            };

            let Some(entries) = due_batch else { continue };
            let subject = templates::batch_subject(priority, entries.len());
            let body = templates::batch_body(&entries);
            let config = self.configs[&priority];

            if self.send_with_retry(&subject, &body, config.max_retries).await {
                info!(priority = priority.label(), count = entries.len(), "batch notification sent");
                if let Some(metrics) = &self.metrics {
                    metrics.record_notification_sent(priority.label());
                }
                self.bus
                    .publish(EventPayload::NotificationSent {
                        notification_type: format!("{}_batch", priority.label()),
                    })
                    .await;
            } else {
                error!(priority = priority.label(), "batch notification failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_notification_failed(priority.label());
                }
                self.bus
                    .publish(EventPayload::NotificationFailed {
                        notification_type: format!("{}_batch", priority.label()),
                        error: "exhausted retries".into(),
                    })
                    .await;
            }
        }
    }
}

#[async_trait]
impl EventHandler for NotificationRouter {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.state.record_activity();
        self.route(event).await;
        Ok(())
    }
}

#[async_trait]
impl Component for NotificationRouter {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        self.state.set_running(true);
        for kind in ROUTED_KINDS {
            self.bus.subscribe(*kind, self.clone()).await;
        }

        let flush_handle = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                if !flush_handle.state.is_running() {
                    break;
                }
                flush_handle.flush_due_batches().await;
                tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
            }
        });
        *self.background.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        for kind in ROUTED_KINDS {
            self.bus.unsubscribe(*kind, NAME).await;
        }
        self.state.set_running(false);
        if let Some(handle) = self.background.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }

    fn health(&self) -> ComponentHealth {
        self.state.health(NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSender {
        sent: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(&self, _subject: &str, _body: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("simulated send failure");
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn critical_event() -> Event {
        Event {
            sequence: 0,
            timestamp: Utc::now(),
            payload: EventPayload::SystemError {
                component: "execution_engine".into(),
                error: "boom".into(),
            },
        }
    }

    #[tokio::test]
    async fn critical_event_sends_immediately() {
        let sent = Arc::new(AtomicUsize::new(0));
        let router = NotificationRouter::new(
            Arc::new(RecordingSender { sent: sent.clone(), fail: false }),
            EventBus::new(),
        );
        router.handle(&critical_event()).await.unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn warning_event_is_batched_not_sent() {
        let sent = Arc::new(AtomicUsize::new(0));
        let router = NotificationRouter::new(
            Arc::new(RecordingSender { sent: sent.clone(), fail: false }),
            EventBus::new(),
        );
        let event = Event {
            sequence: 0,
            timestamp: Utc::now(),
            payload: EventPayload::DumpDetected {
                symbol: "BTC/USDT".into(),
                magnitude_pct: Decimal::new(12, 0),
            },
        };
        router.handle(&event).await.unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 0);

        let inner = router.inner.lock().await;
        assert_eq!(inner.batches[&NotificationPriority::Warning].len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_suppresses_repeated_critical_sends() {
        let sent = Arc::new(AtomicUsize::new(0));
        let router = NotificationRouter::new(
            Arc::new(RecordingSender { sent: sent.clone(), fail: false }),
            EventBus::new(),
        );
        for _ in 0..(MAX_PER_HOUR + 5) {
            router.handle(&critical_event()).await.unwrap();
        }
        assert_eq!(sent.load(Ordering::SeqCst), MAX_PER_HOUR);
    }

}
