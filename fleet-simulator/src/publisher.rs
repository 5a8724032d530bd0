use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};

use energy_client::domain::{EnergyReading, ReadingPayload};

use crate::config::MqttConfig;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("failed to encode reading: {0}")]
    Encode(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Where the fleet driver hands its readings off. Abstracted so driver
/// tests can capture readings without a broker.
#[async_trait]
pub trait ReadingPublisher: Send + Sync {
    async fn publish(&self, reading: &EnergyReading) -> Result<(), PublishError>;
}

/// Fire-and-forget MQTT publisher.
///
/// Readings go out at QoS 0 under `<topic_prefix><meter_id>`; the call
/// neither waits for nor verifies broker acknowledgment, and publish
/// errors are not retried.
pub struct MqttPublisher {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttPublisher {
    /// Connect to the broker, failing fast when it is unreachable instead
    /// of retrying. On success the rumqttc event loop keeps running in a
    /// background task for the life of the publisher.
    pub async fn connect(cfg: &MqttConfig) -> Result<Self, PublishError> {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));

        let (client, mut event_loop) = AsyncClient::new(options, 64);

        // The first poll drives the connect handshake; an unreachable
        // broker fails the run here, at startup.
        if let Err(e) = event_loop.poll().await {
            return Err(PublishError::Connect(e.to_string()));
        }

        tokio::spawn(async move {
            loop {
                if let Err(e) = event_loop.poll().await {
                    tracing::warn!(error = %e, "mqtt event loop stopped");
                    break;
                }
            }
        });

        Ok(Self {
            client,
            topic_prefix: cfg.topic_prefix.clone(),
        })
    }

    pub async fn disconnect(&self) {
        let _ = self.client.disconnect().await;
    }
}

#[async_trait]
impl ReadingPublisher for MqttPublisher {
    async fn publish(&self, reading: &EnergyReading) -> Result<(), PublishError> {
        let topic = format!("{}{}", self.topic_prefix, reading.meter_id);
        let payload = serde_json::to_vec(&ReadingPayload::from(reading))
            .map_err(|e| PublishError::Encode(e.to_string()))?;

        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))
    }
}
