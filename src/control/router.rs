//! Routes broker events into the thermostat.

use super::thermostat::Thermostat;
use crate::output::OutputPin;
use crate::transport::{EventHandler, TransportEvent, parse_temperature_payload};
use log::{debug, info, warn};
use std::sync::Arc;

pub struct ThermostatRouter<P: OutputPin> {
    thermostat: Arc<Thermostat<P>>,
}

impl<P: OutputPin> ThermostatRouter<P> {
    pub fn new(thermostat: Arc<Thermostat<P>>) -> Self {
        Self { thermostat }
    }

    fn handle_message(&self, topic: &str, payload: &str) {
        if topic != self.thermostat.topics().set_target {
            debug!("[MQTT] Ignoring message on {}", topic);
            return;
        }

        let Some(target) = parse_temperature_payload(payload) else {
            warn!("[MQTT] Ignoring unparsable target {:?}", payload);
            return;
        };
        info!("[MQTT] Set target temperature message received: {}", target);
        if let Err(e) = self.thermostat.set_target(target) {
            warn!("[MQTT] Rejected target {}: {}", target, e);
        }
    }
}

impl<P: OutputPin> EventHandler for ThermostatRouter<P> {
    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.thermostat.on_connect(),
            TransportEvent::Disconnected => self.thermostat.on_disconnect(),
            TransportEvent::Message { topic, payload } => self.handle_message(&topic, &payload),
        }
    }
}
