use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use time::OffsetDateTime;

use crate::config::FleetConfig;
use crate::meter::MeterProfile;
use crate::publisher::ReadingPublisher;

/// Draw `count` random 10-digit meter ids.
///
/// Ids are sampled with replacement, so collisions are possible and are
/// not deduplicated; consumers key rows by (meter_id, ts) and tolerate a
/// shared id. A collision-free id space would need draw-without-replacement
/// over a reserved range.
pub fn generate_meter_ids<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<String> {
    (0..count)
        .map(|_| rng.gen_range(1_000_000_000u64..=9_999_999_999).to_string())
        .collect()
}

/// Owns the simulated fleet and the virtual clock that drives it.
///
/// Each tick produces one reading per meter before the clock advances, so
/// a meter's stream is strictly ordered and its timestamps increase by
/// exactly the configured interval. Ordering across meters is not
/// guaranteed.
pub struct FleetDriver {
    meters: Vec<MeterProfile>,
    interval_secs: u64,
    tick_delay: std::time::Duration,
    progress_every: u64,
    rng: StdRng,
}

impl FleetDriver {
    pub fn new(cfg: &FleetConfig) -> Self {
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let meters = generate_meter_ids(cfg.meters, &mut rng)
            .into_iter()
            .map(|id| MeterProfile::new(id, &mut rng))
            .collect();

        Self {
            meters,
            interval_secs: cfg.interval_secs,
            tick_delay: std::time::Duration::from_millis(cfg.tick_delay_ms),
            progress_every: cfg.progress_every,
            rng,
        }
    }

    pub fn meter_count(&self) -> usize {
        self.meters.len()
    }

    /// Walk the virtual clock from `start` (inclusive) to `end` (exclusive)
    /// and publish one reading per meter per step. Returns the number of
    /// readings emitted; this counts publish attempts, not deliveries.
    ///
    /// Publish failures are logged and the reading dropped; the run keeps
    /// going. The `shutdown` flag is honoured at tick boundaries so an
    /// interrupted run stops cleanly between fleet sweeps.
    pub async fn run<P: ReadingPublisher>(
        mut self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        publisher: &P,
        shutdown: Arc<AtomicBool>,
    ) -> u64 {
        let mut current = start;
        let mut emitted: u64 = 0;

        while current < end && !shutdown.load(Ordering::Relaxed) {
            for meter in &self.meters {
                let reading = meter.generate_reading(current, self.interval_secs, &mut self.rng);

                if let Err(e) = publisher.publish(&reading).await {
                    tracing::warn!(
                        error = %e,
                        meter_id = %reading.meter_id,
                        "publish failed, reading dropped"
                    );
                }

                emitted += 1;
                if emitted % self.progress_every == 0 {
                    tracing::info!(emitted, "generated readings so far");
                }
            }

            current += time::Duration::seconds(self.interval_secs as i64);

            // Fixed pacing between fleet sweeps to bound the publish rate.
            if !self.tick_delay.is_zero() {
                tokio::time::sleep(self.tick_delay).await;
            }
        }

        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{PublishError, ReadingPublisher};
    use async_trait::async_trait;
    use energy_client::domain::EnergyReading;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::macros::datetime;

    #[derive(Default)]
    struct RecordingPublisher {
        readings: Mutex<Vec<EnergyReading>>,
    }

    #[async_trait]
    impl ReadingPublisher for RecordingPublisher {
        async fn publish(&self, reading: &EnergyReading) -> Result<(), PublishError> {
            self.readings.lock().unwrap().push(reading.clone());
            Ok(())
        }
    }

    fn test_config(meters: usize, seed: u64) -> FleetConfig {
        FleetConfig {
            meters,
            interval_secs: 300,
            history_days: 14,
            seed: Some(seed),
            tick_delay_ms: 0,
            progress_every: 10_000,
        }
    }

    #[test]
    fn meter_ids_are_ten_digits() {
        let mut rng = StdRng::seed_from_u64(1);
        for id in generate_meter_ids(100, &mut rng) {
            assert_eq!(id.len(), 10);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(id.chars().next(), Some('0'));
        }
    }

    #[tokio::test]
    async fn every_tick_emits_one_reading_per_meter() {
        let driver = FleetDriver::new(&test_config(3, 42));
        let publisher = RecordingPublisher::default();

        let start = datetime!(2025-03-03 00:00:00 UTC);
        let end = datetime!(2025-03-03 00:20:00 UTC); // four 300 s ticks

        let emitted = driver
            .run(start, end, &publisher, Arc::new(AtomicBool::new(false)))
            .await;

        let readings = publisher.readings.lock().unwrap();
        assert_eq!(emitted, 12);
        assert_eq!(readings.len(), 12);
    }

    #[tokio::test]
    async fn per_meter_timestamps_advance_by_exactly_the_interval() {
        let driver = FleetDriver::new(&test_config(2, 7));
        let publisher = RecordingPublisher::default();

        let start = datetime!(2025-03-03 00:00:00 UTC);
        let end = datetime!(2025-03-03 01:00:00 UTC);

        driver
            .run(start, end, &publisher, Arc::new(AtomicBool::new(false)))
            .await;

        let readings = publisher.readings.lock().unwrap();
        let mut by_meter: HashMap<String, Vec<OffsetDateTime>> = HashMap::new();
        for r in readings.iter() {
            by_meter.entry(r.meter_id.clone()).or_default().push(r.ts);
        }

        for (meter_id, stamps) in by_meter {
            for pair in stamps.windows(2) {
                assert_eq!(
                    pair[1] - pair[0],
                    time::Duration::seconds(300),
                    "meter {meter_id} skipped or repeated a step"
                );
            }
        }
    }

    #[tokio::test]
    async fn identical_seeds_reproduce_identical_runs() {
        let start = datetime!(2025-03-03 00:00:00 UTC);
        let end = datetime!(2025-03-03 00:10:00 UTC);

        let first = RecordingPublisher::default();
        FleetDriver::new(&test_config(2, 1234))
            .run(start, end, &first, Arc::new(AtomicBool::new(false)))
            .await;

        let second = RecordingPublisher::default();
        FleetDriver::new(&test_config(2, 1234))
            .run(start, end, &second, Arc::new(AtomicBool::new(false)))
            .await;

        let a = first.readings.lock().unwrap();
        let b = second.readings.lock().unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.meter_id, y.meter_id);
            assert_eq!(x.ts, y.ts);
            assert_eq!(x.power, y.power);
            assert_eq!(x.energy, y.energy);
        }
    }

    #[tokio::test]
    async fn shutdown_flag_stops_the_run_before_the_first_tick() {
        let driver = FleetDriver::new(&test_config(5, 9));
        let publisher = RecordingPublisher::default();

        let emitted = driver
            .run(
                datetime!(2025-03-03 00:00:00 UTC),
                datetime!(2025-03-04 00:00:00 UTC),
                &publisher,
                Arc::new(AtomicBool::new(true)),
            )
            .await;

        assert_eq!(emitted, 0);
        assert!(publisher.readings.lock().unwrap().is_empty());
    }
}
