//! Generic MQTT-controlled switch.
//!
//! A single output driven straight from a command topic, with its state
//! mirrored to a retained report topic.

use crate::config::SwitchConfig;
use crate::error::Result;
use crate::output::{OutputController, OutputPin};
use crate::transport::{EventHandler, Outbound, TransportEvent, format_bool, parse_bool_payload};
use log::{debug, error, info};
use std::sync::Arc;

pub struct SwitchBridge<P: OutputPin> {
    name: String,
    set_state_topic: String,
    report_state_topic: String,
    output: OutputController<P>,
    outbound: Arc<Outbound>,
}

impl<P: OutputPin> SwitchBridge<P> {
    pub fn new(config: &SwitchConfig, output: OutputController<P>, outbound: Arc<Outbound>) -> Self {
        let reporter = outbound.clone();
        let topic = config.report_state_topic.clone();
        output.set_observer(move |on: bool| {
            info!("[Switch] {}", if on { "On" } else { "Off" });
            reporter.report(&topic, &format_bool(on));
        });

        Self {
            name: config.name.clone(),
            set_state_topic: config.set_state_topic.clone(),
            report_state_topic: config.report_state_topic.clone(),
            output,
            outbound,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> &OutputController<P> {
        &self.output
    }

    pub fn set_state(&self, on: bool) -> Result<bool> {
        self.output.set_state(on)
    }

    fn on_connect(&self) {
        info!("[MQTT] Setting up subscriptions and publishing initial state");
        self.outbound.subscribe(&self.set_state_topic);
        self.outbound.set_connected(true);
        self.outbound
            .report(&self.report_state_topic, &format_bool(self.output.current_state()));
    }

    /// Switch off and release the output. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        info!("[Switch] {}: releasing output", self.name);
        self.output.shutdown()
    }
}

impl<P: OutputPin> EventHandler for SwitchBridge<P> {
    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connect(),
            TransportEvent::Disconnected => {
                if self.outbound.set_connected(false) {
                    info!("[MQTT] Disconnected, reports suspended until reconnect");
                }
            }
            TransportEvent::Message { topic, payload } if topic == self.set_state_topic => {
                let on = parse_bool_payload(&payload);
                info!("[MQTT] Set switch state message received: {}", on);
                if let Err(e) = self.set_state(on) {
                    error!("[Switch] {}", e);
                }
            }
            TransportEvent::Message { topic, .. } => {
                debug!("[MQTT] Ignoring message on {}", topic);
            }
        }
    }
}
