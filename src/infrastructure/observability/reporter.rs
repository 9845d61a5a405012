//! Push-based metrics reporter.
//!
//! Periodically logs a metrics snapshot; serves as the "periodic log line"
//! fallback used when no scrape endpoint is configured. Grounded on
//! `infrastructure/observability/reporter.rs`'s push-based reporter.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::infrastructure::observability::metrics::Metrics;

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// Periodically logs a metrics snapshot as structured JSON to stdout.
pub struct MetricsReporter {
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics, interval_seconds: u64) -> Self {
        Self { metrics, start_time: Instant::now(), interval: Duration::from_secs(interval_seconds) }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "metrics reporter starting");

        loop {
            tokio::time::sleep(self.interval).await;

            let uptime = self.start_time.elapsed().as_secs();
            self.metrics.uptime_seconds.set(uptime as f64);

            let snapshot = self.collect_snapshot();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    println!("METRICS_JSON:{json}");
                    info!(uptime_seconds = snapshot.uptime_seconds, "metrics snapshot emitted");
                }
                Err(e) => warn!(error = %e, "failed to serialize metrics snapshot"),
            }
        }
    }

    fn collect_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
