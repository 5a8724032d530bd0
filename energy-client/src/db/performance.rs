use anyhow::Result;
use sqlx::PgPool;

/// Engine-reported execution times for the same bucketed-average query run
/// against the raw hypertable and against the continuous aggregate.
///
/// `agg_ms` and `improvement_pct` are `None` when the aggregate-side query
/// is unavailable (view missing, not yet refreshed); the comparison then
/// degrades instead of erroring.
#[derive(Debug, Clone)]
pub struct QueryPathComparison {
    pub meter_id: String,
    pub raw_ms: f64,
    pub agg_ms: Option<f64>,
    pub improvement_pct: Option<f64>,
}

/// Compressed on-disk size of one chunk-interval strategy.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkStrategyStat {
    pub hypertable_name: String,
    pub size_bytes: i64,
}

/// `(raw - agg) / raw * 100`, the percentage saved by the pre-aggregated
/// path.
pub fn improvement_pct(raw_ms: f64, agg_ms: f64) -> f64 {
    (raw_ms - agg_ms) / raw_ms * 100.0
}

/// Pull the `Execution Time: <n> ms` figure out of `EXPLAIN ANALYZE`
/// output. This is the engine-side cost; client overhead is excluded on
/// purpose.
pub fn parse_execution_time_ms<S: AsRef<str>>(plan_lines: &[S]) -> Option<f64> {
    for line in plan_lines {
        let line = line.as_ref();
        if let Some(rest) = line.trim_start().strip_prefix("Execution Time:") {
            let number = rest.trim().trim_end_matches("ms").trim();
            if let Ok(ms) = number.parse::<f64>() {
                return Some(ms);
            }
        }
    }
    None
}

/// Pick one meter present in the store to compare query paths for.
/// Returns `None` on an empty store.
pub async fn sample_meter_id(pool: &PgPool) -> Result<Option<String>> {
    let id: Option<String> =
        sqlx::query_scalar("SELECT meter_id FROM energy_readings LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(id)
}

async fn explain_execution_time(pool: &PgPool, sql: &str) -> Result<Option<f64>> {
    let lines: Vec<String> = sqlx::query_scalar(sql).fetch_all(pool).await?;
    Ok(parse_execution_time_ms(&lines))
}

// Bind parameters are not allowed inside EXPLAIN, so the sample meter is
// picked by a sub-select, matching the reporting query in
// [`sample_meter_id`].
const RAW_QUERY: &str = r#"
    EXPLAIN ANALYZE
    SELECT
        time_bucket('15 minutes', ts) AS bucket,
        AVG(power) AS avg_power
    FROM energy_readings
    WHERE ts >= NOW() - INTERVAL '1 day'
      AND meter_id = (SELECT meter_id FROM energy_readings LIMIT 1)
    GROUP BY bucket
    ORDER BY bucket
"#;

const AGGREGATE_QUERY: &str = r#"
    EXPLAIN ANALYZE
    SELECT
        bucket,
        avg_power
    FROM energy_readings_15min
    WHERE bucket >= NOW() - INTERVAL '1 day'
      AND meter_id = (SELECT meter_id FROM energy_readings LIMIT 1)
    ORDER BY bucket
"#;

/// Run the equivalent windowed bucketed-average query against the raw table
/// and against the 15-minute continuous aggregate, and compare the
/// engine-reported execution times.
///
/// Returns `None` when the store holds no readings yet. A failure on the
/// aggregate side only degrades the comparison (`agg_ms = None`).
pub async fn compare_query_paths(pool: &PgPool) -> Result<Option<QueryPathComparison>> {
    let Some(meter_id) = sample_meter_id(pool).await? else {
        return Ok(None);
    };

    let Some(raw_ms) = explain_execution_time(pool, RAW_QUERY).await? else {
        return Ok(None);
    };

    let agg_ms = match explain_execution_time(pool, AGGREGATE_QUERY).await {
        Ok(ms) => ms,
        Err(e) => {
            tracing::warn!(error = %e, "aggregate view query failed, reporting comparison as unavailable");
            None
        }
    };

    let improvement = agg_ms.map(|agg| improvement_pct(raw_ms, agg));

    Ok(Some(QueryPathComparison {
        meter_id,
        raw_ms,
        agg_ms,
        improvement_pct: improvement,
    }))
}

/// Compressed size per chunk-interval strategy, from the storage engine's
/// own introspection views. The three hypertables hold the same logical
/// data partitioned at 3-hour, 1-day and 1-week chunk widths.
pub async fn chunk_strategy_sizes(pool: &PgPool) -> Result<Vec<ChunkStrategyStat>> {
    let rows = sqlx::query_as::<_, ChunkStrategyStat>(
        r#"
        SELECT
            hypertable_name,
            hypertable_size(format('%I', hypertable_name)::regclass) AS size_bytes
        FROM timescaledb_information.hypertables
        WHERE hypertable_name IN ('energy_readings', 'energy_readings_3h', 'energy_readings_week')
        ORDER BY hypertable_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
