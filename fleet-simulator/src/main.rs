use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use fleet_simulator::{config::SimulatorConfig, fleet::FleetDriver, publisher::MqttPublisher};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("fleet_simulator=info".parse().unwrap_or_else(|_| "info".parse().unwrap()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = SimulatorConfig::load()?;

    let publisher = MqttPublisher::connect(&cfg.mqtt).await?;

    let end = OffsetDateTime::now_utc();
    let start = end - time::Duration::days(cfg.fleet.history_days);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested, stopping at the next tick boundary");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let driver = FleetDriver::new(&cfg.fleet);
    tracing::info!(
        meters = driver.meter_count(),
        %start,
        %end,
        interval_secs = cfg.fleet.interval_secs,
        "starting historical data generation"
    );

    let emitted = driver.run(start, end, &publisher, shutdown).await;

    tracing::info!(emitted, "historical data generation complete");
    publisher.disconnect().await;

    Ok(())
}
