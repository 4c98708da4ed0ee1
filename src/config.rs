//! Startup configuration.
//!
//! Settings come from environment variables, optionally seeded from a `.env`
//! file. Parsing is strict: a malformed or missing required setting is a
//! [`ThermostatError::Configuration`] and the process must stop before any
//! hardware is touched.

use crate::error::{Result, ThermostatError};
use crate::output::Polarity;
use crate::sensor::TemperatureUnit;
use rand::Rng;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Load environment variables from a .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv(env_path: &Path) {
    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            // Env vars take precedence
            if std::env::var(key).is_err() {
                // SAFETY: called from main before the runtime or any other thread starts
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}

/// Directory-safe form of a controller name: punctuation dropped, spaces
/// turned into underscores.
pub fn slug(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_ascii_punctuation())
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// Random MQTT client id such as `thermostat_3f9a...` (32 hex digits).
pub fn generate_client_id(prefix: &str) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..32)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect();
    format!("{}_{}", prefix, suffix)
}

/// Parse a configuration boolean: `true|high|1` or `false|low|0`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "high" | "1" => Some(true),
        "false" | "low" | "0" => Some(false),
        _ => None,
    }
}

/// Typed access to raw key/value settings.
struct Settings<F> {
    lookup: F,
}

impl<F> Settings<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| ThermostatError::config(key, "value cannot be empty"))
    }

    fn parse<T>(&self, key: &str, value: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        value
            .parse()
            .map_err(|e| ThermostatError::config(key, format!("invalid value {:?} ({})", value, e)))
    }

    fn number<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.required(key)?;
        self.parse(key, &value)
    }

    fn number_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            Some(value) => self.parse(key, &value),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.optional(key) {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ThermostatError::config(key, format!("{:?} is not a boolean", value))
            }),
            None => Ok(default),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub use_tls: bool,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttConfig {
    fn from_settings<F>(settings: &Settings<F>, client_prefix: &str) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let broker_host = settings.required("MQTT_BROKER_HOST")?;
        let use_tls = settings.flag("MQTT_USE_SSL", false)?;
        let broker_port = if use_tls {
            settings.number("MQTT_BROKER_PORT_SSL")?
        } else {
            settings.number_or("MQTT_BROKER_PORT", 1883)?
        };

        let (username, password) = if settings.flag("MQTT_USE_AUTHENTICATION", false)? {
            (
                Some(settings.required("MQTT_USERNAME")?),
                Some(settings.required("MQTT_PASSWORD")?),
            )
        } else {
            (None, None)
        };

        let client_id = settings
            .optional("MQTT_CLIENT_ID")
            .unwrap_or_else(|| generate_client_id(client_prefix));

        Ok(Self {
            broker_host,
            broker_port,
            use_tls,
            client_id,
            username,
            password,
        })
    }
}

/// Topics used by the thermostat.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatTopics {
    pub report_heater_state: String,
    pub report_temperature: String,
    pub report_target: String,
    pub set_target: String,
}

#[derive(Debug, Clone)]
pub struct ThermostatConfig {
    pub name: String,
    pub sensor_id: String,
    pub unit: TemperatureUnit,
    /// Deadband half-width in `unit`.
    pub tolerance: f64,
    /// Target used until a setpoint has been commanded and persisted.
    pub default_target: f64,
    pub heater_pin: u32,
    pub heater_polarity: Polarity,
    pub mqtt: MqttConfig,
    pub topics: ThermostatTopics,
    /// File holding the last commanded target.
    pub state_file: PathBuf,
}

impl ThermostatConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Settings { lookup };

        let name = settings.required("THERMOSTAT_NAME")?;
        let sensor_id = settings.required("TEMPERATURE_SENSOR_ID")?;
        let unit = TemperatureUnit::parse(&settings.required("TEMPERATURE_UNIT")?)
            .map_err(|e| ThermostatError::config("TEMPERATURE_UNIT", e))?;

        let tolerance: f64 = settings.number("TEMPERATURE_RANGE")?;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ThermostatError::config(
                "TEMPERATURE_RANGE",
                format!("deadband must be a positive number, got {}", tolerance),
            ));
        }
        let default_target: f64 = settings.number("TEMPERATURE_TARGET_DEFAULT")?;
        if !default_target.is_finite() {
            return Err(ThermostatError::config(
                "TEMPERATURE_TARGET_DEFAULT",
                "must be a finite number",
            ));
        }

        let heater_pin = settings.number("HEATER_CONTROL_OUTPUT_PIN")?;
        let heater_polarity =
            Polarity::from_active_level(settings.flag("HEATER_CONTROL_OUTPUT_ACTIVE", true)?);

        let mqtt = MqttConfig::from_settings(&settings, "thermostat")?;
        let topics = ThermostatTopics {
            report_heater_state: settings.required("MQTT_TOPIC_REPORT_HEATER_STATE")?,
            report_temperature: settings.required("MQTT_TOPIC_REPORT_TEMP")?,
            report_target: settings.required("MQTT_TOPIC_REPORT_TEMP_TARGET")?,
            set_target: settings.required("MQTT_TOPIC_SET_TEMP_TARGET")?,
        };

        let state_file = settings
            .optional("THERMOSTAT_STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_state_file(&name));

        Ok(Self {
            name,
            sensor_id,
            unit,
            tolerance,
            default_target,
            heater_pin,
            heater_polarity,
            mqtt,
            topics,
            state_file,
        })
    }
}

/// `<data dir>/mqtt-thermostat/<slug>.json`, falling back to the working directory.
pub fn default_state_file(name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mqtt-thermostat")
        .join(format!("{}.json", slug(name)))
}

/// Configuration of the generic MQTT switch daemon.
#[derive(Debug, Clone)]
pub struct SwitchConfig {
    pub name: String,
    pub output_pin: u32,
    pub output_polarity: Polarity,
    pub mqtt: MqttConfig,
    pub set_state_topic: String,
    pub report_state_topic: String,
}

impl SwitchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Settings { lookup };
        Ok(Self {
            name: settings.required("SWITCH_NAME")?,
            output_pin: settings.number("SWITCH_CONTROL_OUTPUT_PIN")?,
            output_polarity: Polarity::from_active_level(
                settings.flag("SWITCH_CONTROL_OUTPUT_ACTIVE", true)?,
            ),
            mqtt: MqttConfig::from_settings(&settings, "switch")?,
            set_state_topic: settings.required("MQTT_TOPIC_SET_SWITCH_STATE")?,
            report_state_topic: settings.required("MQTT_TOPIC_REPORT_SWITCH_STATE")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("THERMOSTAT_NAME", "Living Room"),
            ("TEMPERATURE_SENSOR_ID", "28-0316a2791bff"),
            ("TEMPERATURE_UNIT", "F"),
            ("TEMPERATURE_RANGE", "2"),
            ("TEMPERATURE_TARGET_DEFAULT", "70"),
            ("HEATER_CONTROL_OUTPUT_PIN", "17"),
            ("HEATER_CONTROL_OUTPUT_ACTIVE", "low"),
            ("MQTT_BROKER_HOST", "10.0.0.2"),
            ("MQTT_TOPIC_REPORT_HEATER_STATE", "home/living/heater"),
            ("MQTT_TOPIC_REPORT_TEMP", "home/living/temperature"),
            ("MQTT_TOPIC_REPORT_TEMP_TARGET", "home/living/target"),
            ("MQTT_TOPIC_SET_TEMP_TARGET", "home/living/target/set"),
        ])
    }

    fn load(values: &HashMap<&'static str, &'static str>) -> Result<ThermostatConfig> {
        ThermostatConfig::from_lookup(|key| values.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_minimal_config() {
        let config = load(&base()).unwrap();
        assert_eq!(config.name, "Living Room");
        assert_eq!(config.unit, TemperatureUnit::Fahrenheit);
        assert_eq!(config.tolerance, 2.0);
        assert_eq!(config.default_target, 70.0);
        assert_eq!(config.heater_pin, 17);
        assert_eq!(config.heater_polarity, Polarity::ActiveLow);
        assert_eq!(config.mqtt.broker_port, 1883);
        assert!(!config.mqtt.use_tls);
        assert_eq!(config.mqtt.username, None);
        assert_eq!(config.topics.set_target, "home/living/target/set");
        assert!(config.state_file.ends_with("mqtt-thermostat/Living_Room.json"));
    }

    #[test]
    fn test_generated_client_id() {
        let config = load(&base()).unwrap();
        let id = config.mqtt.client_id;
        assert!(id.starts_with("thermostat_"));
        let suffix = &id["thermostat_".len()..];
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_missing_required_key() {
        let mut values = base();
        values.remove("MQTT_TOPIC_REPORT_TEMP");
        let err = load(&values).unwrap_err();
        assert!(err.to_string().contains("MQTT_TOPIC_REPORT_TEMP"));
    }

    #[test]
    fn test_unknown_unit_is_configuration_error() {
        let mut values = base();
        values.insert("TEMPERATURE_UNIT", "r");
        assert!(matches!(
            load(&values),
            Err(ThermostatError::Configuration(_))
        ));
    }

    #[test]
    fn test_non_positive_deadband_rejected() {
        for bad in ["0", "-1", "NaN"] {
            let mut values = base();
            values.insert("TEMPERATURE_RANGE", bad);
            assert!(load(&values).is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_malformed_number() {
        let mut values = base();
        values.insert("HEATER_CONTROL_OUTPUT_PIN", "seventeen");
        let err = load(&values).unwrap_err();
        assert!(err.to_string().contains("HEATER_CONTROL_OUTPUT_PIN"));
    }

    #[test]
    fn test_invalid_boolean() {
        let mut values = base();
        values.insert("HEATER_CONTROL_OUTPUT_ACTIVE", "maybe");
        assert!(load(&values).is_err());
    }

    #[test]
    fn test_tls_requires_ssl_port() {
        let mut values = base();
        values.insert("MQTT_USE_SSL", "true");
        assert!(load(&values).is_err());

        values.insert("MQTT_BROKER_PORT_SSL", "8883");
        let config = load(&values).unwrap();
        assert!(config.mqtt.use_tls);
        assert_eq!(config.mqtt.broker_port, 8883);
    }

    #[test]
    fn test_authentication_requires_credentials() {
        let mut values = base();
        values.insert("MQTT_USE_AUTHENTICATION", "1");
        values.insert("MQTT_USERNAME", "heater");
        assert!(load(&values).is_err());

        values.insert("MQTT_PASSWORD", "secret");
        let config = load(&values).unwrap();
        assert_eq!(config.mqtt.username.as_deref(), Some("heater"));
        assert_eq!(config.mqtt.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("HIGH"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("low"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn test_switch_config() {
        let values = HashMap::from([
            ("SWITCH_NAME", "Porch Light"),
            ("SWITCH_CONTROL_OUTPUT_PIN", "22"),
            ("MQTT_BROKER_HOST", "broker.local"),
            ("MQTT_CLIENT_ID", "porch"),
            ("MQTT_TOPIC_SET_SWITCH_STATE", "porch/light/set"),
            ("MQTT_TOPIC_REPORT_SWITCH_STATE", "porch/light"),
        ]);
        let config =
            SwitchConfig::from_lookup(|key| values.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.output_pin, 22);
        assert_eq!(config.output_polarity, Polarity::ActiveHigh);
        assert_eq!(config.mqtt.client_id, "porch");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Living Room"), "Living_Room");
        assert_eq!(slug("Tim's heater!"), "Tims_heater");
    }
}
