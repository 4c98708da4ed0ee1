//! Setpoint, deadband and the two-point heater decision.

use crate::error::{Result, ThermostatError};

/// Target temperature with its deadband.
///
/// The bounds are derived once, on construction, and the whole value is
/// replaced on every target change, so a target is never paired with
/// another target's bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    target: f64,
    tolerance: f64,
    lower: f64,
    upper: f64,
}

impl Setpoint {
    /// A setpoint `target ± tolerance`. The tolerance must be positive.
    pub fn new(target: f64, tolerance: f64) -> Result<Self> {
        if !target.is_finite() {
            return Err(ThermostatError::InvalidSetpoint(format!(
                "target {} is not a finite number",
                target
            )));
        }
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ThermostatError::InvalidSetpoint(format!(
                "deadband {} must be a positive number",
                tolerance
            )));
        }
        Ok(Self {
            target,
            tolerance,
            lower: target - tolerance,
            upper: target + tolerance,
        })
    }

    /// Same deadband around a new target.
    pub fn with_target(&self, target: f64) -> Result<Self> {
        Self::new(target, self.tolerance)
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Below this the heater switches on.
    pub fn lower_bound(&self) -> f64 {
        self.lower
    }

    /// Above this the heater switches off.
    pub fn upper_bound(&self) -> f64 {
        self.upper
    }
}

/// Logical heater state, mapped 1:1 onto the output (`Heating` = on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterState {
    Idle,
    Heating,
}

impl HeaterState {
    pub fn from_output(on: bool) -> Self {
        if on {
            HeaterState::Heating
        } else {
            HeaterState::Idle
        }
    }

    pub fn is_on(self) -> bool {
        self == HeaterState::Heating
    }

    /// The state to switch to for `temperature`, or `None` to stay put.
    pub fn next(self, temperature: f64, setpoint: &Setpoint) -> Option<HeaterState> {
        match self {
            HeaterState::Idle if temperature < setpoint.lower_bound() => Some(HeaterState::Heating),
            HeaterState::Heating if temperature > setpoint.upper_bound() => Some(HeaterState::Idle),
            _ => None,
        }
    }
}
