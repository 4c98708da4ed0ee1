//! Message bus boundary.
//!
//! The controllers only need to publish retained reports and subscribe to
//! command topics. [`Transport`] captures that; [`MqttClient`] feeds broker
//! traffic back in as [`TransportEvent`]s which an [`EventHandler`] consumes.

mod client;

pub use client::MqttClient;

use crate::error::Result;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Fire-and-forget publish/subscribe capability.
///
/// Implementations must not block: requests are queued and delivered by
/// whatever drives the connection.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()>;

    fn subscribe(&self, topic: &str) -> Result<()>;
}

impl Transport for AsyncClient {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        self.try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())?;
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<()> {
        info!("[MQTT] Subscribing to {}", topic);
        self.try_subscribe(topic, QoS::AtLeastOnce)?;
        Ok(())
    }
}

/// Connection lifecycle and inbound messages from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message { topic: String, payload: String },
}

/// Consumer of transport events.
pub trait EventHandler: Send {
    fn handle(&self, event: TransportEvent);
}

impl<H: EventHandler + Sync + ?Sized> EventHandler for Arc<H> {
    fn handle(&self, event: TransportEvent) {
        (**self).handle(event)
    }
}

/// Feed every event from `rx` to `handler` until the channel closes.
pub async fn dispatch<H: EventHandler>(handler: H, mut rx: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = rx.recv().await {
        handler.handle(event);
    }
    warn!("[MQTT] Event channel closed");
}

/// Outbound side of the bus, gated on the connection state.
///
/// Reports are dropped while disconnected; the snapshot published on the
/// next connect brings subscribers up to date.
pub struct Outbound {
    transport: Arc<dyn Transport>,
    connected: AtomicBool,
}

impl Outbound {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Record the connection state, returning the previous one.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::SeqCst)
    }

    /// Publish a retained report if connected. Returns whether it was queued.
    pub fn report(&self, topic: &str, payload: &str) -> bool {
        if !self.is_connected() {
            debug!("[MQTT] Offline, not reporting {} = {}", topic, payload);
            return false;
        }
        match self.transport.publish(topic, payload, true) {
            Ok(()) => {
                debug!("[MQTT] Reported {} = {}", topic, payload);
                true
            }
            Err(e) => {
                warn!("[MQTT] Failed to report {}: {}", topic, e);
                false
            }
        }
    }

    pub fn subscribe(&self, topic: &str) {
        if let Err(e) = self.transport.subscribe(topic) {
            warn!("[MQTT] Failed to subscribe to {}: {}", topic, e);
        }
    }
}

/// Temperature payload: plain decimal with at least one fractional digit.
pub fn format_temperature(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

pub fn format_bool(value: bool) -> String {
    value.to_string()
}

/// Parse a numeric payload, rejecting non-finite values.
pub fn parse_temperature_payload(payload: &str) -> Option<f64> {
    payload
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// `true` in any case means on; anything else means off.
pub fn parse_bool_payload(payload: &str) -> bool {
    payload.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// One request seen by a [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Request {
        Publish {
            topic: String,
            payload: String,
            retain: bool,
        },
        Subscribe(String),
    }

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub requests: Mutex<Vec<Request>>,
    }

    impl RecordingTransport {
        /// Payloads published to `topic`, in order.
        pub fn published(&self, topic: &str) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .filter_map(|r| match r {
                    Request::Publish { topic: t, payload, .. } if t == topic => {
                        Some(payload.clone())
                    }
                    _ => None,
                })
                .collect()
        }

        pub fn publish_count(&self) -> usize {
            self.requests
                .lock()
                .iter()
                .filter(|r| matches!(r, Request::Publish { .. }))
                .count()
        }

        pub fn clear(&self) {
            self.requests.lock().clear();
        }
    }

    impl Transport for RecordingTransport {
        fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
            self.requests.lock().push(Request::Publish {
                topic: topic.to_string(),
                payload: payload.to_string(),
                retain,
            });
            Ok(())
        }

        fn subscribe(&self, topic: &str) -> Result<()> {
            self.requests.lock().push(Request::Subscribe(topic.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_reports_are_dropped_while_offline() {
        let transport = Arc::new(RecordingTransport::default());
        let outbound = Outbound::new(transport.clone());

        assert!(!outbound.report("t", "1.0"));
        assert_eq!(transport.publish_count(), 0);

        assert!(!outbound.set_connected(true));
        assert!(outbound.report("t", "2.0"));
        assert_eq!(
            *transport.requests.lock(),
            vec![Request::Publish {
                topic: "t".into(),
                payload: "2.0".into(),
                retain: true,
            }]
        );
    }

    #[test]
    fn test_format_temperature() {
        assert_eq!(format_temperature(70.0), "70.0");
        assert_eq!(format_temperature(68.5), "68.5");
        assert_eq!(format_temperature(68.55), "68.55");
        assert_eq!(format_temperature(-3.0), "-3.0");
    }

    #[test]
    fn test_parse_temperature_payload() {
        assert_eq!(parse_temperature_payload("71.5"), Some(71.5));
        assert_eq!(parse_temperature_payload(" 68 \n"), Some(68.0));
        assert_eq!(parse_temperature_payload("warm"), None);
        assert_eq!(parse_temperature_payload("inf"), None);
        assert_eq!(parse_temperature_payload("NaN"), None);
    }

    #[test]
    fn test_parse_bool_payload() {
        assert!(parse_bool_payload("true"));
        assert!(parse_bool_payload("True"));
        assert!(!parse_bool_payload("False"));
        assert!(!parse_bool_payload("on"));
    }

    struct Collector(Arc<Mutex<Vec<TransportEvent>>>);

    impl EventHandler for Collector {
        fn handle(&self, event: TransportEvent) {
            self.0.lock().push(event);
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(8);
        let pump = tokio::spawn(dispatch(Collector(seen.clone()), rx));

        tx.send(TransportEvent::Connected).await.unwrap();
        tx.send(TransportEvent::Message {
            topic: "a".into(),
            payload: "b".into(),
        })
        .await
        .unwrap();
        tx.send(TransportEvent::Disconnected).await.unwrap();
        drop(tx);

        tokio_test::assert_ok!(pump.await);
        assert_eq!(
            *seen.lock(),
            vec![
                TransportEvent::Connected,
                TransportEvent::Message {
                    topic: "a".into(),
                    payload: "b".into(),
                },
                TransportEvent::Disconnected,
            ]
        );
    }
}
