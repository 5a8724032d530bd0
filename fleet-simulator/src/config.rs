use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topics are `<topic_prefix><meter_id>`, e.g. `energy/meters/`.
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Number of simulated meters.
    pub meters: usize,
    /// Virtual-clock step between readings.
    pub interval_secs: u64,
    /// How far back the historical window starts, relative to now.
    pub history_days: i64,
    /// Seed for the fleet rng. Omit for a fresh fleet each run; set it to
    /// reproduce an identical fleet and reading stream.
    pub seed: Option<u64>,
    /// Fixed pause after each full fleet sweep, bounding the publish rate.
    pub tick_delay_ms: u64,
    /// Progress is logged every this many emitted readings.
    pub progress_every: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    pub mqtt: MqttConfig,
    pub fleet: FleetConfig,
}

impl SimulatorConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("SIMULATOR_CONFIG").unwrap_or_else(|_| "simulator-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: SimulatorConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}
