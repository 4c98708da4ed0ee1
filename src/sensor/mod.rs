//! Temperature sensing.
//!
//! A [`TemperatureProbe`] produces raw Celsius readings from hardware. The
//! [`SensorReader`] wraps a probe, discards physically implausible readings,
//! retries transient read races and converts accepted readings into the
//! configured display unit.

pub mod w1;

pub use w1::W1Therm;

use crate::error::{Result, ThermostatError};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;

/// Failed attempts (implausible or transient) tolerated by a single read.
pub const MAX_READ_ATTEMPTS: u32 = 30;

/// Pause before retrying after a transient read race.
pub const TRANSIENT_BACKOFF: Duration = Duration::from_secs(1);

/// Lowest raw Celsius reading accepted as physically plausible.
pub const PLAUSIBLE_MIN_CELSIUS: f64 = -6.01;

/// Highest raw Celsius reading accepted as physically plausible.
pub const PLAUSIBLE_MAX_CELSIUS: f64 = 45.01;

/// Display unit for temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum TemperatureUnit {
    #[strum(to_string = "f")]
    Fahrenheit,
    #[strum(to_string = "c")]
    Celsius,
    #[strum(to_string = "k")]
    Kelvin,
}

impl TemperatureUnit {
    /// Parse a unit name, rejecting anything but f, c or k (any case).
    pub fn parse(value: &str) -> Result<Self> {
        value
            .trim()
            .parse()
            .map_err(|_| ThermostatError::UnsupportedUnit(value.to_string()))
    }

    /// Convert a Celsius value into this unit.
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => celsius_to_fahrenheit(celsius),
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Kelvin => celsius_to_kelvin(celsius),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Kelvin => "K",
        }
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 1.8 + 32.0
}

pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + 273.15
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whether a raw Celsius reading lies inside the plausibility band.
pub fn is_plausible(celsius: f64) -> bool {
    (PLAUSIBLE_MIN_CELSIUS..=PLAUSIBLE_MAX_CELSIUS).contains(&celsius)
}

/// One accepted temperature reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub value: f64,
    pub unit: TemperatureUnit,
    pub taken_at: DateTime<Utc>,
}

/// Errors raised by a probe for a single read attempt.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The device was caught mid-conversion or failed its checksum; worth retrying.
    #[error("transient read error: {0}")]
    Transient(String),

    #[error("malformed sensor output: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Source of raw Celsius readings.
pub trait TemperatureProbe: Send {
    /// Identifier used in log messages.
    fn id(&self) -> &str;

    /// Take one raw reading in degrees Celsius.
    fn read_celsius(&mut self) -> std::result::Result<f64, ProbeError>;
}

/// Validated reads from a temperature probe.
pub struct SensorReader<T> {
    probe: T,
    backoff: Duration,
}

impl<T: TemperatureProbe> SensorReader<T> {
    pub fn new(probe: T) -> Self {
        Self {
            probe,
            backoff: TRANSIENT_BACKOFF,
        }
    }

    /// Override the pause taken after a transient read race.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn probe(&self) -> &T {
        &self.probe
    }

    /// Read one plausible temperature in `unit`, rounded to two decimals.
    ///
    /// Implausible readings and transient read races are retried; after
    /// [`MAX_READ_ATTEMPTS`] failed attempts the sensor is considered
    /// unavailable. Any other probe error is returned immediately.
    pub fn read(&mut self, unit: TemperatureUnit) -> Result<SensorSample> {
        let mut failures = 0;
        loop {
            let transient = match self.probe.read_celsius() {
                Ok(celsius) if is_plausible(celsius) => {
                    let value = round2(unit.from_celsius(celsius));
                    debug!("[Sensor] {} read {}{}", self.probe.id(), value, unit.symbol());
                    return Ok(SensorSample {
                        value,
                        unit,
                        taken_at: Utc::now(),
                    });
                }
                Ok(celsius) => {
                    warn!(
                        "[Sensor] {}: bad temperature reading: {}°C",
                        self.probe.id(),
                        celsius
                    );
                    false
                }
                Err(ProbeError::Transient(reason)) => {
                    warn!("[Sensor] {}: {}", self.probe.id(), reason);
                    true
                }
                Err(e) => {
                    return Err(ThermostatError::SensorUnavailable(format!(
                        "{}: {}",
                        self.probe.id(),
                        e
                    )));
                }
            };

            failures += 1;
            if failures >= MAX_READ_ATTEMPTS {
                return Err(ThermostatError::SensorUnavailable(format!(
                    "{}: no plausible reading after {} attempts, sensor not connected or not functioning correctly",
                    self.probe.id(),
                    failures
                )));
            }
            if transient {
                std::thread::sleep(self.backoff);
            }
        }
    }
}
