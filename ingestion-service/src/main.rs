use std::{sync::Arc, time::Duration};

use anyhow::Result;
use energy_client::domain::EnergyReading;
use ingestion_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::TimescaleSink,
    sources::MqttSource,
    transform::ReadingValidation,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        observability::serve_metrics(&metrics_cfg.bind_addr)?;
    }

    // Store unreachable at startup is fatal; no retry loop.
    let pool = PgPoolOptions::new()
        .max_connections(cfg.timescale.max_connections)
        .acquire_timeout(Duration::from_secs(cfg.timescale.acquire_timeout_secs))
        .connect(&cfg.timescale.uri)
        .await?;

    let source = MqttSource::connect(&cfg.mqtt, cfg.pipeline.channel_capacity).await?;

    // Ctrl-c disconnects the broker session; the source stream then ends
    // and the sink flushes whatever is buffered before the process exits.
    let client = source.client();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested, draining in-flight readings");
            let _ = client.disconnect().await;
        }
    });

    let sink = TimescaleSink::new(
        pool,
        cfg.sink.batch_size,
        cfg.sink.max_retries,
        Duration::from_millis(cfg.sink.retry_backoff_ms),
    );

    let pipeline: Pipeline<_, EnergyReading, _> = Pipeline {
        source,
        transforms: vec![Arc::new(ReadingValidation)],
        sink,
    };

    pipeline.run().await?;

    tracing::info!("ingestion stopped");
    Ok(())
}
