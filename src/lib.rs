//! MQTT thermostat library.
//!
//! Hysteresis control of a relay-driven heater from a 1-Wire temperature
//! probe, with setpoint commands and state reports over MQTT. A generic
//! MQTT-driven switch shares the same output and transport plumbing.

pub mod config;
pub mod control;
pub mod error;
pub mod instance_lock;
pub mod output;
pub mod persistence;
pub mod sensor;
pub mod shutdown;
pub mod switch;
pub mod transport;
