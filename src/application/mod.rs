// Component lifecycle base (Component trait, health, shared state helper)
pub mod lifecycle;

// Signal generation: primary analyzers, secondary filters, confluence
pub mod decision;

// Signal-to-order execution pipeline
pub mod execution;

// Notification routing
pub mod notifications;

// Position monitoring, trailing stops, portfolio risk
pub mod position;

// Market data: the concrete analytics-snapshot collaborator
pub mod market_data;

// System orchestrator
pub mod system;

// Event-bus-to-storage-contract bridge
pub mod storage;
