//! End-to-end smoke test: build the full system in mock mode, push a
//! synthetic tick through the bus, and confirm it reaches the decision
//! engine without the process ever touching a real exchange.

use rustrade::config::Config;
use rustrade::application::system::System;
use rustrade::domain::events::EventPayload;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn tick_flows_from_snapshot_cache_through_the_bus() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = Config::from_env()?;
    let system = System::start(config).await?;

    system
        .bus
        .publish(EventPayload::TradeTickReceived {
            symbol: "BTC/USDT".to_string(),
            price: Decimal::new(50000, 0),
            quantity: Decimal::new(1, 0),
        })
        .await;

    sleep(Duration::from_millis(50)).await;

    let snapshot = system.snapshot_cache.get_snapshot("mock", "BTC/USDT").await;
    assert!(snapshot.is_some());

    system.shutdown().await;
    Ok(())
}
