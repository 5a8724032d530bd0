use std::f64::consts::PI;

use rand::Rng;
use time::{OffsetDateTime, Weekday};

use energy_client::domain::EnergyReading;

/// Fixed per-meter parameters, drawn once at fleet creation and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct MeterProfile {
    pub meter_id: String,
    /// Base consumption in kW.
    pub base_power: f64,
    /// Nominal line voltage in V.
    pub base_voltage: f64,
    pub power_factor: f64,
}

/// Load multiplier for the hour of day: morning peak, evening peak, night
/// low, flat otherwise.
pub fn time_of_day_factor(hour: u8) -> f64 {
    match hour {
        6..=8 => 1.5,
        17..=21 => 1.8,
        22..=23 | 0..=4 => 0.6,
        _ => 1.0,
    }
}

/// Weekend consumption runs higher across the whole day.
pub fn day_factor(weekday: Weekday) -> f64 {
    match weekday {
        Weekday::Saturday | Weekday::Sunday => 1.2,
        _ => 1.0,
    }
}

/// Slow diurnal swing, one full sine period per day.
pub fn diurnal_sine_factor(hour: u8, minute: u8) -> f64 {
    let minute_of_day = f64::from(hour) * 60.0 + f64::from(minute);
    0.1 * (minute_of_day * 2.0 * PI / (60.0 * 24.0)).sin()
}

/// Combine the base load with all modulation factors.
pub fn compose_power(
    base_power: f64,
    time_factor: f64,
    random_factor: f64,
    day_factor: f64,
    sine_factor: f64,
) -> f64 {
    base_power * time_factor * random_factor * day_factor * (1.0 + sine_factor)
}

fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

impl MeterProfile {
    /// Draw a fresh profile for `meter_id`: base power 0.8–2.5 kW, voltage
    /// 220–240 V, power factor 0.90–0.98.
    pub fn new<R: Rng + ?Sized>(meter_id: String, rng: &mut R) -> Self {
        Self {
            meter_id,
            base_power: rng.gen_range(0.8..2.5),
            base_voltage: rng.gen_range(220.0..240.0),
            power_factor: rng.gen_range(0.9..0.98),
        }
    }

    /// Synthesize the reading for one instant. Pure given the injected rng:
    /// the same profile, timestamp and rng state always produce the same
    /// reading.
    ///
    /// Outputs are rounded at the boundary (power/current 3 dp, voltage
    /// 1 dp, frequency 2 dp, energy 4 dp) so the wire representation is
    /// deterministic.
    pub fn generate_reading<R: Rng + ?Sized>(
        &self,
        ts: OffsetDateTime,
        interval_secs: u64,
        rng: &mut R,
    ) -> EnergyReading {
        let power = compose_power(
            self.base_power,
            time_of_day_factor(ts.hour()),
            rng.gen_range(0.9..1.1),
            day_factor(ts.weekday()),
            diurnal_sine_factor(ts.hour(), ts.minute()),
        );

        let voltage = self.base_voltage * rng.gen_range(0.98..1.02);
        let current = power * 1000.0 / (voltage * self.power_factor);
        let frequency = 50.0 + rng.gen_range(-0.1..0.1);
        let energy = power * (interval_secs as f64 / 3600.0);

        EnergyReading {
            ts,
            meter_id: self.meter_id.clone(),
            power: round_to(power, 3),
            voltage: round_to(voltage, 1),
            current: round_to(current, 3),
            frequency: round_to(frequency, 2),
            energy: round_to(energy, 4),
        }
    }
}
