use anyhow::Result;
use energy_client::db::performance;
use ingestion_service::{config::AppConfig, observability};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.timescale.max_connections)
        .connect(&cfg.timescale.uri)
        .await?;

    match performance::compare_query_paths(&pool).await? {
        Some(cmp) => match (cmp.agg_ms, cmp.improvement_pct) {
            (Some(agg_ms), Some(improvement)) => {
                tracing::info!(
                    meter_id = %cmp.meter_id,
                    raw_ms = cmp.raw_ms,
                    agg_ms,
                    improvement_pct = improvement,
                    "raw vs continuous-aggregate query comparison"
                );
            }
            _ => {
                tracing::info!(
                    meter_id = %cmp.meter_id,
                    raw_ms = cmp.raw_ms,
                    "aggregate view unavailable, comparison skipped"
                );
            }
        },
        None => {
            tracing::info!("no readings in the store yet, generate data first");
        }
    }

    let sizes = performance::chunk_strategy_sizes(&pool).await?;
    if sizes.is_empty() {
        tracing::info!("no hypertables found, apply sql/schema first");
    }
    for stat in sizes {
        tracing::info!(
            hypertable = %stat.hypertable_name,
            size_bytes = stat.size_bytes,
            "chunk strategy storage footprint"
        );
    }

    Ok(())
}
