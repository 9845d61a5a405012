pub mod binance;
pub mod factory;
pub mod mock;
