use energy_client::domain::EnergyReading;
use time::macros::datetime;

use crate::pipeline::{Envelope, PipelineError, Transform};

/// Pure validation of a decoded reading.
///
/// Rules:
/// - all measurements must be finite numbers;
/// - power, voltage and energy must be non-negative;
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01).
pub fn validate_reading(env: Envelope<EnergyReading>) -> Result<Envelope<EnergyReading>, PipelineError> {
    let r = &env.payload;

    if r.meter_id.is_empty() {
        return Err(PipelineError::Validate("meter_id must not be empty".to_string()));
    }

    for (name, value) in [
        ("power", r.power),
        ("voltage", r.voltage),
        ("current", r.current),
        ("frequency", r.frequency),
        ("energy", r.energy),
    ] {
        if !value.is_finite() {
            return Err(PipelineError::Validate(format!("{name} must be finite, got {value}")));
        }
    }

    if r.power < 0.0 || r.voltage < 0.0 || r.energy < 0.0 {
        return Err(PipelineError::Validate(
            "power, voltage and energy must be non-negative".to_string(),
        ));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);
    if r.ts < min_ts || r.ts >= max_ts {
        return Err(PipelineError::Validate("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<EnergyReading, EnergyReading> for ReadingValidation {
    async fn apply(
        &self,
        input: Envelope<EnergyReading>,
    ) -> Result<Envelope<EnergyReading>, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
