use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Snapshot of a component's operational state, returned by `Component::health`.
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub running: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub error_count: u64,
}

/// Shared bookkeeping every `Component` implementer embeds. Always-on
/// components flip `running` in `start`/`stop`; reactive components flip it
/// on subscribe/unsubscribe. `record_activity`/`record_error` are called from
/// whatever event handler or loop iteration the component runs.
#[derive(Debug)]
pub struct ComponentState {
    running: AtomicBool,
    last_activity: RwLock<Option<DateTime<Utc>>>,
    error_count: AtomicU64,
}

impl Default for ComponentState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            last_activity: RwLock::new(None),
            error_count: AtomicU64::new(0),
        }
    }
}

impl ComponentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn record_activity(&self) {
        *self.last_activity.write().expect("lock poisoned") = Some(Utc::now());
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        *self.last_activity.read().expect("lock poisoned")
    }

    pub fn health(&self, name: impl Into<String>) -> ComponentHealth {
        ComponentHealth {
            name: name.into(),
            running: self.is_running(),
            last_activity: self.last_activity(),
            error_count: self.error_count(),
        }
    }
}

/// Uniform lifecycle surface for both always-on components (background
/// loops) and reactive components (subscribe/unsubscribe only). `start`/
/// `stop` are idempotent: calling `start` on an already-running component is
/// a no-op, not an error. Both take `self: Arc<Self>` because subscribing to
/// the event bus requires handing it an owned `Arc<dyn EventHandler>` — a
/// component can only subscribe itself, and only unsubscribe itself, while
/// already held behind the same `Arc` its caller constructed it in.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    async fn start(self: Arc<Self>) -> anyhow::Result<()>;
    async fn stop(self: Arc<Self>) -> anyhow::Result<()>;
    fn health(&self) -> ComponentHealth;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_not_running_with_no_activity() {
        let state = ComponentState::new();
        let health = state.health("test");
        assert!(!health.running);
        assert_eq!(health.error_count, 0);
        assert!(health.last_activity.is_none());
    }

    #[test]
    fn record_activity_and_error_update_health() {
        let state = ComponentState::new();
        state.set_running(true);
        state.record_activity();
        state.record_error();
        state.record_error();
        let health = state.health("test");
        assert!(health.running);
        assert!(health.last_activity.is_some());
        assert_eq!(health.error_count, 2);
    }
}
