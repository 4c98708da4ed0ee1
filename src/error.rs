use crate::instance_lock::InstanceLockError;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ThermostatError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Temperature sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Unknown temperature unit: {0:?} (expected f, c or k)")]
    UnsupportedUnit(String),

    #[error("Invalid setpoint: {0}")]
    InvalidSetpoint(String),

    #[error("Output {pin} failed: {source}")]
    Output {
        pin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MQTT request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    InstanceLock(#[from] InstanceLockError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl ThermostatError {
    /// Shorthand for a configuration error naming the offending setting.
    pub fn config(key: &str, reason: impl std::fmt::Display) -> Self {
        ThermostatError::Configuration(format!("{}: {}", key, reason))
    }
}

impl From<rumqttc::ClientError> for ThermostatError {
    fn from(e: rumqttc::ClientError) -> Self {
        ThermostatError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThermostatError>;
