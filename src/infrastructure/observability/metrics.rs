//! Prometheus metrics definitions for the trading engine.
//!
//! All metrics use the `rustrade_` prefix and are read-only.

use prometheus::{
    CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
};
use std::sync::Arc;

/// Prometheus metrics for the event-driven trading engine.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Events published by kind.
    pub events_published_total: CounterVec,
    /// Events delivered to a handler by kind.
    pub events_delivered_total: CounterVec,
    /// Events dropped before delivery (no subscribers, bus shutdown) by kind.
    pub events_dropped_total: CounterVec,
    /// Handler dispatch errors by handler name.
    pub handler_errors_total: CounterVec,
    /// Handler dispatch latency by handler name.
    pub handler_latency_seconds: HistogramVec,
    /// Orders currently tracked by the order manager, by state.
    pub order_manager_active: GenericGaugeVec<AtomicF64>,
    /// Total order-state transitions recorded, by terminal state.
    pub order_manager_history_total: CounterVec,
    /// Notifications sent, by priority tier.
    pub notifications_sent_total: CounterVec,
    /// Notifications that failed to send after retries, by priority tier.
    pub notifications_failed_total: CounterVec,
    /// Notifications suppressed by the rate limiter.
    pub notifications_suppressed_total: CounterVec,
    /// Connection-pool acquisitions that hit a resident pool vs. opened fresh.
    pub connection_pool_acquire_total: CounterVec,
    /// Exchange call latency by exchange and operation.
    pub exchange_latency_seconds: HistogramVec,
    /// Server uptime in seconds.
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_published_total = CounterVec::new(
            Opts::new("rustrade_events_published_total", "Events published by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(events_published_total.clone()))?;

        let events_delivered_total = CounterVec::new(
            Opts::new("rustrade_events_delivered_total", "Events delivered to a handler by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(events_delivered_total.clone()))?;

        let events_dropped_total = CounterVec::new(
            Opts::new("rustrade_events_dropped_total", "Events dropped before delivery by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(events_dropped_total.clone()))?;

        let handler_errors_total = CounterVec::new(
            Opts::new("rustrade_handler_errors_total", "Handler dispatch errors by handler name"),
            &["handler"],
        )?;
        registry.register(Box::new(handler_errors_total.clone()))?;

        let handler_latency_seconds = HistogramVec::new(
            HistogramOpts::new("rustrade_handler_latency_seconds", "Handler dispatch latency in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["handler"],
        )?;
        registry.register(Box::new(handler_latency_seconds.clone()))?;

        let order_manager_active = GaugeVec::new(
            Opts::new("rustrade_order_manager_active", "Orders currently tracked by the order manager"),
            &["state"],
        )?;
        registry.register(Box::new(order_manager_active.clone()))?;

        let order_manager_history_total = CounterVec::new(
            Opts::new("rustrade_order_manager_history_total", "Order-state transitions recorded"),
            &["state"],
        )?;
        registry.register(Box::new(order_manager_history_total.clone()))?;

        let notifications_sent_total = CounterVec::new(
            Opts::new("rustrade_notifications_sent_total", "Notifications sent by priority tier"),
            &["priority"],
        )?;
        registry.register(Box::new(notifications_sent_total.clone()))?;

        let notifications_failed_total = CounterVec::new(
            Opts::new("rustrade_notifications_failed_total", "Notifications failed after retries by priority tier"),
            &["priority"],
        )?;
        registry.register(Box::new(notifications_failed_total.clone()))?;

        let notifications_suppressed_total = CounterVec::new(
            Opts::new("rustrade_notifications_suppressed_total", "Notifications suppressed by the rate limiter"),
            &["priority"],
        )?;
        registry.register(Box::new(notifications_suppressed_total.clone()))?;

        let connection_pool_acquire_total = CounterVec::new(
            Opts::new("rustrade_connection_pool_acquire_total", "Connection-pool acquisitions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(connection_pool_acquire_total.clone()))?;

        let exchange_latency_seconds = HistogramVec::new(
            HistogramOpts::new("rustrade_exchange_latency_seconds", "Exchange call latency in seconds")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["exchange", "operation"],
        )?;
        registry.register(Box::new(exchange_latency_seconds.clone()))?;

        let uptime_seconds =
            prometheus::Gauge::with_opts(Opts::new("rustrade_uptime_seconds", "Server uptime in seconds"))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            events_published_total,
            events_delivered_total,
            events_dropped_total,
            handler_errors_total,
            handler_latency_seconds,
            order_manager_active,
            order_manager_history_total,
            notifications_sent_total,
            notifications_failed_total,
            notifications_suppressed_total,
            connection_pool_acquire_total,
            exchange_latency_seconds,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn record_published(&self, kind: &str) {
        self.events_published_total.with_label_values(&[kind]).inc();
    }

    pub fn record_delivered(&self, kind: &str) {
        self.events_delivered_total.with_label_values(&[kind]).inc();
    }

    pub fn record_dropped(&self, kind: &str) {
        self.events_dropped_total.with_label_values(&[kind]).inc();
    }

    pub fn record_handler_error(&self, handler: &str) {
        self.handler_errors_total.with_label_values(&[handler]).inc();
    }

    pub fn observe_handler_latency(&self, handler: &str, seconds: f64) {
        self.handler_latency_seconds.with_label_values(&[handler]).observe(seconds);
    }

    pub fn set_order_manager_active(&self, state: &str, count: f64) {
        self.order_manager_active.with_label_values(&[state]).set(count);
    }

    pub fn record_order_transition(&self, state: &str) {
        self.order_manager_history_total.with_label_values(&[state]).inc();
    }

    pub fn record_notification_sent(&self, priority: &str) {
        self.notifications_sent_total.with_label_values(&[priority]).inc();
    }

    pub fn record_notification_failed(&self, priority: &str) {
        self.notifications_failed_total.with_label_values(&[priority]).inc();
    }

    pub fn record_notification_suppressed(&self, priority: &str) {
        self.notifications_suppressed_total.with_label_values(&[priority]).inc();
    }

    pub fn record_pool_acquire(&self, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.connection_pool_acquire_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_exchange_latency(&self, exchange: &str, operation: &str, seconds: f64) {
        self.exchange_latency_seconds.with_label_values(&[exchange, operation]).observe(seconds);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to create default Metrics")
    }
}
