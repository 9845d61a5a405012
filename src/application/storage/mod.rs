// Reactive bridge from the event bus into the storage contract
pub mod persistence;
