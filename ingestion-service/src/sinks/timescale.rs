use std::time::Duration;

use energy_client::domain::EnergyReading;
use futures::StreamExt;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Batching writer for the `energy_readings` hypertable.
///
/// Envelopes are buffered up to `batch_size` and written in one multi-row
/// INSERT; whatever remains is flushed when the input stream ends, so a
/// shutdown drains in-flight readings. The insert path has no
/// deduplication: replaying a message produces a second row.
///
/// Only transient failures (I/O, pool timeouts) are retried, as a unit
/// with linear backoff; a permanent error or an exhausted retry budget
/// drops the whole batch (rows are never split or partially retried) and
/// the sink moves on.
/// Whether a store error is worth retrying. Connection-level failures
/// come and go; anything the server evaluated and rejected will fail the
/// same way on every attempt.
fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
    )
}

pub struct TimescaleSink {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl TimescaleSink {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size,
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<EnergyReading>]) {
        if batch.is_empty() {
            return;
        }

        let mut attempt: u32 = 0;
        loop {
            match self.insert_batch(batch).await {
                Ok(()) => {
                    metrics::counter!("timescale_ingested_rows_total").increment(batch.len() as u64);

                    if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                        let lag = OffsetDateTime::now_utc() - min_received;
                        metrics::histogram!("ingest_end_to_end_latency_seconds")
                            .record(lag.as_seconds_f64().max(0.0));
                    }

                    tracing::debug!(rows = batch.len(), "batch stored");
                    return;
                }
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "timescale flush failed, retrying with backoff"
                    );
                    metrics::counter!("timescale_retry_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    // Store failure for one batch is recovered locally: the
                    // rows are dropped and intake continues.
                    tracing::error!(error = %e, rows = batch.len(), "timescale flush failed, dropping batch");
                    metrics::counter!("timescale_dropped_rows_total").increment(batch.len() as u64);
                    return;
                }
            }
        }
    }

    async fn insert_batch(&self, batch: &[Envelope<EnergyReading>]) -> Result<(), sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO energy_readings (meter_id, ts, power, voltage, current, frequency, energy) ",
        );

        builder.push_values(batch, |mut b, env| {
            let r = &env.payload;
            b.push_bind(&r.meter_id)
                .push_bind(r.ts)
                .push_bind(r.power)
                .push_bind(r.voltage)
                .push_bind(r.current)
                .push_bind(r.frequency)
                .push_bind(r.energy);
        });

        builder.build().execute(&self.pool).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Sink<EnergyReading> for TimescaleSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<EnergyReading>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut buffer: Vec<Envelope<EnergyReading>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!(error = %e, "reading rejected upstream, skipping");
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await;
                buffer.clear();
            }
        }

        // Stream ended (broker disconnect or shutdown): drain what is left.
        if !buffer.is_empty() {
            self.flush_batch(&buffer).await;
        }

        Ok(())
    }
}
