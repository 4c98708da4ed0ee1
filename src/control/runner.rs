//! Fixed-cadence polling loop.

use super::thermostat::Thermostat;
use crate::error::Result;
use crate::output::OutputPin;
use crate::sensor::{SensorReader, SensorSample, TemperatureProbe};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause between two control ticks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Blocking control loop: read, report, decide, switch, sleep.
///
/// Meant to run on its own thread; every tick completes its sensor read and
/// output write before the next one starts.
pub struct ControlLoop<P: OutputPin, T: TemperatureProbe> {
    thermostat: Arc<Thermostat<P>>,
    reader: SensorReader<T>,
    interval: Duration,
}

impl<P: OutputPin, T: TemperatureProbe> ControlLoop<P, T> {
    pub fn new(thermostat: Arc<Thermostat<P>>, reader: SensorReader<T>) -> Self {
        Self {
            thermostat,
            reader,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Take one reading and apply it.
    pub fn tick(&mut self) -> Result<SensorSample> {
        let sample = self.reader.read(self.thermostat.unit())?;
        self.thermostat.apply_reading(sample.value)?;
        Ok(sample)
    }

    /// Poll until `cancel` fires or a tick fails.
    ///
    /// Whatever ends the loop, the heater is released before returning and
    /// `cancel` is triggered so the rest of the process winds down with it.
    pub fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let _stop_others = cancel.clone().drop_guard();
        info!(
            "[Control] Polling {} every {:?}",
            self.reader.probe().id(),
            self.interval
        );

        let result = self.poll(&cancel);
        match &result {
            Ok(()) => info!("[Control] Stopped"),
            Err(e) => error!("[Control] Stopping on fatal error: {}", e),
        }

        let released = self.thermostat.shutdown();
        if let Err(e) = &released {
            error!("[Control] {}", e);
        }
        result.and(released)
    }

    fn poll(&mut self, cancel: &CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            self.tick()?;
            std::thread::sleep(self.interval);
        }
        Ok(())
    }
}
