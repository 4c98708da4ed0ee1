//! Two-point (hysteresis) temperature control.
//!
//! - [`Setpoint`] / [`HeaterState`]: the deadband and the switching rule
//! - [`Thermostat`]: shared state owned by the controller
//! - [`ControlLoop`]: the blocking polling loop
//! - [`ThermostatRouter`]: applies broker events (connects, set-target messages)

mod router;
mod runner;
mod setpoint;
mod thermostat;

pub use router::ThermostatRouter;
pub use runner::{ControlLoop, POLL_INTERVAL};
pub use setpoint::{HeaterState, Setpoint};
pub use thermostat::{REPORT_THRESHOLD, Thermostat};
