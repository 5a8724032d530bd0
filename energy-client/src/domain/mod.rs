pub mod energy_reading;
pub mod wire;

pub use energy_reading::EnergyReading;
pub use wire::ReadingPayload;
