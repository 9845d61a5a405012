pub mod event_bus;
pub mod exchange;
pub mod notifications;
pub mod observability;
pub mod storage;

pub use event_bus::EventBus;
