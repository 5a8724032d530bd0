use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::EnergyReading;

/// A fixed-width time bucket with the average power observed inside it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BucketedAvgPower {
    pub bucket: OffsetDateTime,
    pub avg_power: f64,
}

/// Day-scale rollup combining average power with total consumed energy.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyEnergy {
    pub bucket: OffsetDateTime,
    pub avg_power: f64,
    pub total_energy: f64,
}

/// Total energy attributed to a region over a window.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegionEnergy {
    pub region: String,
    pub total_energy: f64,
}

/// Region key of a meter: the leading digit of its id.
///
/// Must stay in sync with the `LEFT(meter_id, 1)` grouping used in
/// [`region_total_energy`].
pub fn region_of(meter_id: &str) -> &str {
    meter_id.get(..1).unwrap_or("")
}

/// Fetch full-resolution readings newer than `since`, newest first.
///
/// An empty result set is a normal state (no data generated yet), not an
/// error; callers render it as such.
pub async fn recent_readings(pool: &PgPool, since: OffsetDateTime) -> Result<Vec<EnergyReading>> {
    let rows = sqlx::query_as::<_, EnergyReading>(
        r#"
        SELECT
            ts,
            meter_id,
            power,
            voltage,
            current,
            frequency,
            energy
        FROM energy_readings
        WHERE ts >= $1
        ORDER BY ts DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Average power across the whole fleet, bucketed on the fly from the raw
/// table. `bucket_width` is a Postgres interval literal such as `1 hour`.
pub async fn bucketed_avg_power(
    pool: &PgPool,
    bucket_width: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<BucketedAvgPower>> {
    let rows = sqlx::query_as::<_, BucketedAvgPower>(
        r#"
        SELECT
            time_bucket($1::interval, ts) AS bucket,
            AVG(power) AS avg_power
        FROM energy_readings
        WHERE ts >= $2
          AND ts <  $3
        GROUP BY bucket
        ORDER BY bucket
        "#,
    )
    .bind(bucket_width)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Day buckets with average power and total energy, for trend views.
pub async fn daily_power_and_energy(
    pool: &PgPool,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<DailyEnergy>> {
    let rows = sqlx::query_as::<_, DailyEnergy>(
        r#"
        SELECT
            time_bucket('1 day', ts) AS bucket,
            AVG(power) AS avg_power,
            SUM(energy) AS total_energy
        FROM energy_readings
        WHERE ts >= $1
          AND ts <  $2
        GROUP BY bucket
        ORDER BY bucket
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Total energy per region since `since`, where the region is the leading
/// digit of the meter id.
pub async fn region_total_energy(pool: &PgPool, since: OffsetDateTime) -> Result<Vec<RegionEnergy>> {
    let rows = sqlx::query_as::<_, RegionEnergy>(
        r#"
        SELECT
            LEFT(meter_id, 1) AS region,
            SUM(energy) AS total_energy
        FROM energy_readings
        WHERE ts >= $1
        GROUP BY region
        ORDER BY region
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
