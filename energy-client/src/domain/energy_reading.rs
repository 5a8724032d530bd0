use time::OffsetDateTime;

/// One timestamped measurement tuple for a single meter, in the shape of
/// an `energy_readings` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnergyReading {
    pub ts: OffsetDateTime,
    pub meter_id: String,
    /// Active power in kW.
    pub power: f64,
    /// Line voltage in V.
    pub voltage: f64,
    /// Line current in A.
    pub current: f64,
    /// Grid frequency in Hz.
    pub frequency: f64,
    /// Energy consumed over the reading interval in kWh.
    pub energy: f64,
}
