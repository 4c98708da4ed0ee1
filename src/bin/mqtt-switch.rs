//! Generic MQTT switch daemon.
//!
//! Drives one GPIO output from a command topic and reports its state.
//!
//! Usage:
//!   mqtt-switch [--env-file .env]

use clap::Parser;
use log::{error, info, warn};
use mqtt_thermostat::config::{SwitchConfig, load_dotenv};
use mqtt_thermostat::error::{Result, ThermostatError};
use mqtt_thermostat::instance_lock::InstanceLock;
use mqtt_thermostat::output::{OutputController, SysfsGpio};
use mqtt_thermostat::shutdown::ShutdownSignals;
use mqtt_thermostat::switch::SwitchBridge;
use mqtt_thermostat::transport::{MqttClient, Outbound, dispatch};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "mqtt-switch", version, disable_version_flag = true)]
#[command(about = "Relay output switched over MQTT")]
struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    _version: Option<bool>,

    /// File to seed environment settings from
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    load_dotenv(&cli.env_file);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = match SwitchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Starting MQTT switch {:?} on gpio{} ({:?})",
        config.name, config.output_pin, config.output_polarity
    );

    match run(config).await {
        Ok(()) => {
            info!("MQTT switch stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: SwitchConfig) -> Result<()> {
    let mut signals = ShutdownSignals::install()?;
    let _lock = InstanceLock::acquire(&config.name)?;

    let gpio = SysfsGpio::export(config.output_pin, config.output_polarity.level(false))
        .map_err(|source| ThermostatError::Output {
            pin: format!("gpio{}", config.output_pin),
            source,
        })?;
    let output = OutputController::new(gpio, config.output_polarity)?;

    let mqtt = MqttClient::new(&config.mqtt);
    let outbound = Arc::new(Outbound::new(Arc::new(mqtt.client())));
    let bridge = Arc::new(SwitchBridge::new(&config, output, outbound));

    let (tx, rx) = mpsc::channel(100);
    let mqtt_task = tokio::spawn(mqtt.run(tx));
    let mut pump = tokio::spawn(dispatch(bridge.clone(), rx));

    info!("MQTT switch {:?} is running, press Ctrl+C to exit", bridge.name());
    tokio::select! {
        signal = signals.recv() => info!("Received {}, shutting down", signal),
        _ = &mut pump => warn!("[MQTT] Event pump ended"),
    }

    pump.abort();
    mqtt_task.abort();
    bridge.shutdown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_short_version_flag() {
        for flag in ["-v", "--version"] {
            let Err(err) = Cli::try_parse_from(["mqtt-switch", flag]) else {
                panic!("{} did not print the version", flag);
            };
            assert_eq!(err.kind(), ErrorKind::DisplayVersion);
        }
    }

    #[test]
    fn test_env_file_default() {
        let cli = Cli::try_parse_from(["mqtt-switch"]).unwrap();
        assert_eq!(cli.env_file, PathBuf::from(".env"));
    }
}
