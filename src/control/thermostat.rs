//! Shared thermostat state.
//!
//! [`Thermostat`] is the single owner of the setpoint, the last reading and
//! the heater output. The polling thread and the MQTT handler both work
//! through it; critical sections only copy or replace values; hardware
//! writes, persistence and publishing happen outside the lock.

use super::setpoint::{HeaterState, Setpoint};
use crate::config::{ThermostatConfig, ThermostatTopics};
use crate::error::Result;
use crate::output::{OutputController, OutputPin};
use crate::persistence::TargetStore;
use crate::sensor::TemperatureUnit;
use crate::transport::{Outbound, format_bool, format_temperature};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;

/// Temperature changes smaller than this (in the display unit) are not reported.
pub const REPORT_THRESHOLD: f64 = 0.1;

struct ControlState {
    setpoint: Setpoint,
    current_temperature: Option<f64>,
    last_reported_temperature: Option<f64>,
}

impl ControlState {
    /// Readings carry two decimals, so the delta is compared in whole
    /// hundredths rather than as a raw float difference.
    fn should_report(&self, temperature: f64) -> bool {
        match self.last_reported_temperature {
            Some(last) => {
                (hundredths(temperature) - hundredths(last)).abs() > hundredths(REPORT_THRESHOLD)
            }
            None => true,
        }
    }
}

fn hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

pub struct Thermostat<P: OutputPin> {
    name: String,
    unit: TemperatureUnit,
    topics: ThermostatTopics,
    state: Mutex<ControlState>,
    heater: OutputController<P>,
    outbound: Arc<Outbound>,
    store: Box<dyn TargetStore>,
}

impl<P: OutputPin> Thermostat<P> {
    /// Assemble the thermostat around an initialised heater output.
    ///
    /// The starting target is the persisted one when the store has it,
    /// otherwise the configured default.
    pub fn new(
        config: &ThermostatConfig,
        heater: OutputController<P>,
        outbound: Arc<Outbound>,
        store: Box<dyn TargetStore>,
    ) -> Result<Self> {
        let target = store.load().unwrap_or(config.default_target);
        let setpoint = Setpoint::new(target, config.tolerance)?;

        let reporter = outbound.clone();
        let topic = config.topics.report_heater_state.clone();
        heater.set_observer(move |on: bool| {
            info!("[Heater] {}", if on { "Heating" } else { "Idle" });
            reporter.report(&topic, &format_bool(on));
        });

        info!(
            "[Control] {}: target {}{} (heat below {}, idle above {})",
            config.name,
            setpoint.target(),
            config.unit.symbol(),
            setpoint.lower_bound(),
            setpoint.upper_bound()
        );

        Ok(Self {
            name: config.name.clone(),
            unit: config.unit,
            topics: config.topics.clone(),
            state: Mutex::new(ControlState {
                setpoint,
                current_temperature: None,
                last_reported_temperature: None,
            }),
            heater,
            outbound,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn topics(&self) -> &ThermostatTopics {
        &self.topics
    }

    pub fn setpoint(&self) -> Setpoint {
        self.state.lock().setpoint
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.state.lock().current_temperature
    }

    pub fn heater_state(&self) -> HeaterState {
        HeaterState::from_output(self.heater.current_state())
    }

    pub fn heater(&self) -> &OutputController<P> {
        &self.heater
    }

    /// Replace the target. Bounds are recomputed with it in one step; the
    /// output is left alone until the next reading is applied.
    pub fn set_target(&self, target: f64) -> Result<Setpoint> {
        let setpoint = {
            let mut state = self.state.lock();
            let next = state.setpoint.with_target(target)?;
            state.setpoint = next;
            next
        };
        info!(
            "[Control] Target set to {}{} (heat below {}, idle above {})",
            setpoint.target(),
            self.unit.symbol(),
            setpoint.lower_bound(),
            setpoint.upper_bound()
        );

        if let Err(e) = self.store.save(setpoint.target()) {
            error!("[Control] Failed to persist target {}: {}", setpoint.target(), e);
        }
        self.outbound
            .report(&self.topics.report_target, &format_temperature(setpoint.target()));
        Ok(setpoint)
    }

    /// Feed one temperature reading through reporting and the hysteresis
    /// rule. Returns the new heater state if a transition fired.
    pub fn apply_reading(&self, temperature: f64) -> Result<Option<HeaterState>> {
        let connected = self.outbound.is_connected();
        let (report, setpoint) = {
            let mut state = self.state.lock();
            state.current_temperature = Some(temperature);
            let report = connected && state.should_report(temperature);
            if report {
                state.last_reported_temperature = Some(temperature);
            }
            (report, state.setpoint)
        };

        if report {
            self.outbound.report(
                &self.topics.report_temperature,
                &format_temperature(temperature),
            );
        }

        let Some(next) = self.heater_state().next(temperature, &setpoint) else {
            return Ok(None);
        };
        debug!(
            "[Control] {}{} outside [{}, {}], switching to {:?}",
            temperature,
            self.unit.symbol(),
            setpoint.lower_bound(),
            setpoint.upper_bound(),
            next
        );
        self.heater.set_state(next.is_on())?;
        Ok(Some(next))
    }

    /// Subscribe to the set-target topic and publish heater state, current
    /// temperature and target unconditionally.
    pub fn on_connect(&self) {
        info!("[MQTT] Setting up subscriptions and publishing initial state");
        self.outbound.subscribe(&self.topics.set_target);
        self.outbound.set_connected(true);

        let (target, temperature) = {
            let mut state = self.state.lock();
            state.last_reported_temperature = state.current_temperature;
            (state.setpoint.target(), state.current_temperature)
        };
        let heating = self.heater.current_state();

        self.outbound
            .report(&self.topics.report_heater_state, &format_bool(heating));
        if let Some(temperature) = temperature {
            self.outbound.report(
                &self.topics.report_temperature,
                &format_temperature(temperature),
            );
        }
        self.outbound
            .report(&self.topics.report_target, &format_temperature(target));
    }

    pub fn on_disconnect(&self) {
        if self.outbound.set_connected(false) {
            info!("[MQTT] Disconnected, reports suspended until reconnect");
        }
    }

    /// Switch the heater off and release it. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        info!("[Control] {}: releasing heater output", self.name);
        self.heater.shutdown()
    }
}
