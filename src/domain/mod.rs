// Domain-specific error types
pub mod errors;

// Event catalog and payloads
pub mod events;

// Port interfaces: the collaborator traits the application layer consumes
pub mod ports;

// Open position tracking
pub mod position;

// Derived analytics snapshots
pub mod snapshot;

// Per-pair storage contract
pub mod storage;

// Core trading domain entities and value objects
pub mod trading;
