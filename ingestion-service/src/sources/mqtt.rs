use std::{sync::Arc, time::Duration};

use energy_client::domain::{EnergyReading, ReadingPayload};
use futures::{Stream, StreamExt};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    config::MqttConfig,
    pipeline::{Envelope, PipelineError, Source},
};

/// Rebuild a reading from one inbound message.
///
/// The topic structure is load-bearing: the meter id is the suffix after
/// the last `/`, not part of the JSON body. Absent payload fields take
/// their defaults, with a missing timestamp filled from `arrival`.
pub(crate) fn decode_reading(
    topic: &str,
    payload: &[u8],
    arrival: OffsetDateTime,
) -> Result<EnergyReading, PipelineError> {
    let meter_id = topic
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PipelineError::Decode(format!("topic '{topic}' has no meter id suffix")))?;

    let wire: ReadingPayload = serde_json::from_slice(payload)
        .map_err(|e| PipelineError::Decode(format!("invalid payload on '{topic}': {e}")))?;

    Ok(wire.into_reading(meter_id.to_string(), arrival))
}

/// Subscribes to the full meter namespace (`<prefix>#`) and feeds decoded
/// readings into a bounded channel.
///
/// A full channel blocks the intake task, pushing backpressure into the
/// broker session instead of buffering without limit. Undecodable messages
/// are counted and dropped; the loop keeps going. A connection error after
/// subscribing ends the stream so the service drains and exits; there is
/// no reconnect loop.
#[derive(Clone)]
pub struct MqttSource {
    client: AsyncClient,
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<EnergyReading>>>>>,
}

impl MqttSource {
    pub async fn connect(cfg: &MqttConfig, channel_capacity: usize) -> Result<Self, PipelineError> {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));

        let (client, mut event_loop) = AsyncClient::new(options, 64);

        // The first poll drives the connect handshake; an unreachable
        // broker fails the service here, at startup.
        if let Err(e) = event_loop.poll().await {
            return Err(PipelineError::Transport(format!("mqtt connect failed: {e}")));
        }

        let wildcard = format!("{}#", cfg.topic_prefix);
        client
            .subscribe(wildcard.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| PipelineError::Transport(format!("subscribe to '{wildcard}' failed: {e}")))?;
        tracing::info!(topic = %wildcard, "subscribed to meter topics");

        let (tx, rx) = mpsc::channel(channel_capacity);

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        metrics::counter!("mqtt_messages_total").increment(1);

                        let arrival = OffsetDateTime::now_utc();
                        match decode_reading(&publish.topic, &publish.payload, arrival) {
                            Ok(reading) => {
                                let env = Envelope {
                                    payload: reading,
                                    received_at: arrival,
                                };
                                if tx.send(env).await.is_err() {
                                    // Consumer gone; nothing left to feed.
                                    break;
                                }
                            }
                            Err(e) => {
                                metrics::counter!("mqtt_decode_errors_total").increment(1);
                                tracing::warn!(error = %e, topic = %publish.topic, "message dropped");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "mqtt connection lost, stopping intake");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client,
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        })
    }

    /// Handle for shutdown signalling: disconnecting ends the intake loop,
    /// which closes the channel and lets the sink drain.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }
}

#[async_trait::async_trait]
impl Source<EnergyReading> for MqttSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<EnergyReading>, PipelineError>> + Send>>
    {
        let mut guard = self.receiver.lock().await;
        let rx = guard
            .take()
            .expect("MqttSource stream already taken; only one consumer supported");

        Box::pin(ReceiverStream::new(rx).map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const ARRIVAL: OffsetDateTime = datetime!(2025-03-05 18:05:00 UTC);

    #[test]
    fn meter_id_comes_from_the_topic_suffix() {
        let payload = br#"{"timestamp":"2025-03-05T18:00:00Z","power":3.6}"#;
        let reading = decode_reading("energy/meters/1234567890", payload, ARRIVAL).unwrap();

        assert_eq!(reading.meter_id, "1234567890");
        assert_eq!(reading.ts, datetime!(2025-03-05 18:00:00 UTC));
        assert_eq!(reading.power, 3.6);
    }

    #[test]
    fn missing_fields_default_and_timestamp_falls_back_to_arrival() {
        let reading = decode_reading("energy/meters/42", b"{}", ARRIVAL).unwrap();

        assert_eq!(reading.ts, ARRIVAL);
        assert_eq!(reading.power, 0.0);
        assert_eq!(reading.voltage, 0.0);
        assert_eq!(reading.current, 0.0);
        assert_eq!(reading.frequency, 0.0);
        assert_eq!(reading.energy, 0.0);
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let res = decode_reading("energy/meters/42", b"not json at all", ARRIVAL);
        assert!(matches!(res, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn topic_without_meter_suffix_is_rejected() {
        let res = decode_reading("energy/meters/", b"{}", ARRIVAL);
        assert!(matches!(res, Err(PipelineError::Decode(_))));
    }
}
