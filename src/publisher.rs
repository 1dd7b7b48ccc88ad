//! Outbound messages: snapshot and alert payloads, and the MQTT sink.

use crate::calibration::ValueSnapshot;
use crate::notifier::AlertEvent;
use rumqttc::{AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

pub const ALERT_TOPIC: &str = "log";

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid broker address '{0}', expected host:port")]
    InvalidAddress(String),
    #[error("broker connection failed: {0}")]
    Connect(#[from] ConnectionError),
    #[error("broker did not acknowledge the connection within {0:?}")]
    ConnectTimeout(Duration),
    #[error("publish to '{topic}' failed: {source}")]
    Client {
        topic: String,
        #[source]
        source: ClientError,
    },
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publisher rejected message on '{0}'")]
    Rejected(String),
}

/// Delivery seam between the meter and whatever carries its messages.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertFormat {
    /// `{"Name":..,"Value":"on"|"off","Time":..,"DeviceName":..}`
    #[default]
    Json,
    /// `name:on` / `name:off`
    Text,
}

#[derive(Serialize)]
struct AlertMessage<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "DeviceName")]
    device_name: &'a str,
}

pub fn encode_snapshot(snapshot: &ValueSnapshot) -> Result<Vec<u8>, PublishError> {
    Ok(serde_json::to_vec(snapshot)?)
}

pub fn encode_alert(event: &AlertEvent, format: AlertFormat) -> Result<Vec<u8>, PublishError> {
    match format {
        AlertFormat::Json => {
            let message = AlertMessage {
                name: event.channel.name(),
                value: event.transition.as_str(),
                time: event.timestamp(),
                device_name: &event.device,
            };
            Ok(serde_json::to_vec(&message)?)
        }
        AlertFormat::Text => {
            Ok(format!("{}:{}", event.channel.name(), event.transition.as_str()).into_bytes())
        }
    }
}

pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

fn split_address(address: &str) -> Result<(String, u16), PublishError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| PublishError::InvalidAddress(address.to_owned()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| PublishError::InvalidAddress(address.to_owned()))?;
    if host.is_empty() {
        return Err(PublishError::InvalidAddress(address.to_owned()));
    }
    Ok((host.to_owned(), port))
}

/// MQTT sink. Publishing only enqueues into the client's request channel;
/// the event loop task does the network I/O.
pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
    event_loop: JoinHandle<()>,
}

impl MqttPublisher {
    /// Connect and wait for the broker's CONNACK before returning.
    pub async fn connect(
        address: &str,
        client_id: &str,
        qos: QoS,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let (host, port) = split_address(address)?;

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        tokio::time::timeout(timeout, wait_for_connack(&mut event_loop))
            .await
            .map_err(|_| PublishError::ConnectTimeout(timeout))??;

        tracing::info!(broker = %address, client_id, "connected to broker");

        let broker = address.to_owned();
        let event_loop = tokio::spawn(drive_event_loop(event_loop, broker));

        Ok(Self {
            client,
            qos,
            event_loop,
        })
    }

    pub async fn disconnect(self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::warn!(error = %e, "broker disconnect failed");
        }
        self.event_loop.abort();
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, self.qos, false, payload.to_vec())
            .map_err(|source| PublishError::Client {
                topic: topic.to_owned(),
                source,
            })
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), PublishError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = event_loop.poll().await? {
            return Ok(());
        }
    }
}

async fn drive_event_loop(mut event_loop: EventLoop, broker: String) {
    tracing::debug!(%broker, "MQTT event loop started");

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!(%broker, "reconnected to broker");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(%broker, error = %e, "MQTT event loop error");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
