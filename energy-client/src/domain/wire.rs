use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::EnergyReading;

/// The JSON body published for one reading.
///
/// The meter id is not part of the payload; it travels in the topic
/// (`<prefix><meter_id>`). Every field is optional on decode: absent numeric
/// fields default to `0.0` and an absent `timestamp` is filled in with the
/// arrival instant by the subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingPayload {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub frequency: f64,
    #[serde(default)]
    pub energy: f64,
}

impl ReadingPayload {
    /// Rehydrate a full reading from the wire form plus the topic-derived
    /// meter id, falling back to `arrival` when the payload carried no
    /// timestamp.
    pub fn into_reading(self, meter_id: String, arrival: OffsetDateTime) -> EnergyReading {
        EnergyReading {
            ts: self.timestamp.unwrap_or(arrival),
            meter_id,
            power: self.power,
            voltage: self.voltage,
            current: self.current,
            frequency: self.frequency,
            energy: self.energy,
        }
    }
}

impl From<&EnergyReading> for ReadingPayload {
    fn from(r: &EnergyReading) -> Self {
        Self {
            timestamp: Some(r.ts),
            power: r.power,
            voltage: r.voltage,
            current: r.current,
            frequency: r.frequency,
            energy: r.energy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn full_payload_decodes_with_timestamp() {
        let json = r#"{
            "timestamp": "2025-03-05T18:00:00Z",
            "power": 3.6,
            "voltage": 230.1,
            "current": 16.473,
            "frequency": 50.02,
            "energy": 0.3
        }"#;

        let payload: ReadingPayload = serde_json::from_str(json).unwrap();
        let reading = payload.into_reading("1234567890".to_string(), datetime!(2025-03-06 00:00:00 UTC));

        assert_eq!(reading.ts, datetime!(2025-03-05 18:00:00 UTC));
        assert_eq!(reading.meter_id, "1234567890");
        assert_eq!(reading.power, 3.6);
        assert_eq!(reading.energy, 0.3);
    }

    #[test]
    fn missing_numeric_fields_default_to_zero() {
        let payload: ReadingPayload = serde_json::from_str(r#"{"power": 1.5}"#).unwrap();

        assert_eq!(payload.power, 1.5);
        assert_eq!(payload.voltage, 0.0);
        assert_eq!(payload.current, 0.0);
        assert_eq!(payload.frequency, 0.0);
        assert_eq!(payload.energy, 0.0);
    }

    #[test]
    fn missing_timestamp_falls_back_to_arrival_instant() {
        let arrival = datetime!(2025-03-05 18:05:00 UTC);
        let payload: ReadingPayload = serde_json::from_str("{}").unwrap();
        let reading = payload.into_reading("42".to_string(), arrival);

        assert_eq!(reading.ts, arrival);
    }

    #[test]
    fn payload_round_trips_through_json() {
        let reading = EnergyReading {
            ts: datetime!(2025-03-05 18:00:00 UTC),
            meter_id: "9876543210".to_string(),
            power: 2.145,
            voltage: 231.4,
            current: 9.762,
            frequency: 49.98,
            energy: 0.1788,
        };

        let json = serde_json::to_string(&ReadingPayload::from(&reading)).unwrap();
        let decoded: ReadingPayload = serde_json::from_str(&json).unwrap();
        let back = decoded.into_reading(reading.meter_id.clone(), datetime!(2020-01-01 00:00:00 UTC));

        assert_eq!(back.ts, reading.ts);
        assert_eq!(back.power, reading.power);
        assert_eq!(back.voltage, reading.voltage);
        assert_eq!(back.current, reading.current);
        assert_eq!(back.frequency, reading.frequency);
        assert_eq!(back.energy, reading.energy);
    }
}
