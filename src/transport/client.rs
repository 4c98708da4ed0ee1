//! MQTT client wrapper around rumqttc.

use super::TransportEvent;
use crate::config::MqttConfig;
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet,
    Transport as MqttTransport,
};
use std::time::Duration;
use tokio::sync::mpsc;

/// Pause between reconnect attempts after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// MQTT client for the thermostat and switch daemons.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(60));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            info!("[MQTT] Using username/password authentication");
            options.set_credentials(username, password);
        } else {
            info!("[MQTT] Using anonymous login");
        }

        if config.use_tls {
            info!("[MQTT] TLS enabled");
            options.set_transport(MqttTransport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Self { client, event_loop }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Run the MQTT event loop and forward connection changes and received
    /// messages to the provided channel.
    ///
    /// Runs until the receiving side of the channel is dropped. Connection
    /// errors are logged and the connection is retried after a short pause.
    pub async fn run(mut self, tx: mpsc::Sender<TransportEvent>) {
        info!("[MQTT] Starting event loop");
        let mut connected = false;

        loop {
            let event = match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("[MQTT] Connected");
                        connected = true;
                        Some(TransportEvent::Connected)
                    } else {
                        warn!("[MQTT] Broker refused connection: {:?}", ack.code);
                        None
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match String::from_utf8(publish.payload.to_vec()) {
                        Ok(payload) => {
                            debug!("[MQTT] Received on {}: {}", publish.topic, payload);
                            Some(TransportEvent::Message {
                                topic: publish.topic,
                                payload,
                            })
                        }
                        Err(e) => {
                            warn!("[MQTT] Invalid UTF-8 in payload on {}: {}", publish.topic, e);
                            None
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("[MQTT] Broker closed the connection");
                    std::mem::replace(&mut connected, false).then_some(TransportEvent::Disconnected)
                }
                Ok(_) => None,
                Err(e) => {
                    error!("[MQTT] Connection error: {:?}", e);
                    let lost =
                        std::mem::replace(&mut connected, false).then_some(TransportEvent::Disconnected);
                    if let Some(event) = lost
                        && tx.send(event).await.is_err()
                    {
                        break;
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            if let Some(event) = event
                && tx.send(event).await.is_err()
            {
                error!("[MQTT] Event channel closed");
                break;
            }
        }
    }
}
