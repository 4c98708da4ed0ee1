//! MQTT thermostat daemon.
//!
//! Usage:
//!   mqtt-thermostat [--env-file .env] [--state-file /var/lib/thermostat.json]

use clap::Parser;
use log::{error, info, warn};
use mqtt_thermostat::config::{ThermostatConfig, load_dotenv};
use mqtt_thermostat::control::{ControlLoop, Thermostat, ThermostatRouter};
use mqtt_thermostat::error::{Result, ThermostatError};
use mqtt_thermostat::instance_lock::InstanceLock;
use mqtt_thermostat::output::{OutputController, SysfsGpio};
use mqtt_thermostat::persistence::JsonTargetStore;
use mqtt_thermostat::sensor::{SensorReader, W1Therm};
use mqtt_thermostat::shutdown::ShutdownSignals;
use mqtt_thermostat::transport::{MqttClient, Outbound, dispatch};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "mqtt-thermostat", version, disable_version_flag = true)]
#[command(about = "Hysteresis thermostat for a relay-driven heater, controlled over MQTT")]
struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    _version: Option<bool>,

    /// File to seed environment settings from
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Where to persist the commanded target (overrides THERMOSTAT_STATE_FILE)
    #[arg(long)]
    state_file: Option<PathBuf>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    load_dotenv(&cli.env_file);
    init_logger();

    let mut config = match ThermostatConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(state_file) = cli.state_file {
        config.state_file = state_file;
    }

    info!("Starting MQTT thermostat {:?}", config.name);
    info!("  Sensor: {} ({})", config.sensor_id, config.unit);
    info!("  Heater: gpio{} ({:?})", config.heater_pin, config.heater_polarity);
    info!(
        "  Broker: {}:{}{}",
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        if config.mqtt.use_tls { " (TLS)" } else { "" }
    );

    match run(config) {
        Ok(()) => {
            info!("MQTT thermostat stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: ThermostatConfig) -> Result<()> {
    let _lock = InstanceLock::acquire(&config.name)?;

    // Handlers go in before the GPIO line is exported
    let runtime = tokio::runtime::Runtime::new()?;
    let mut signals = {
        let _guard = runtime.enter();
        ShutdownSignals::install()?
    };

    let store = JsonTargetStore::new(&config.state_file);
    info!("  Target file: {}", store.path().display());
    let gpio = SysfsGpio::export(config.heater_pin, config.heater_polarity.level(false))
        .map_err(|source| ThermostatError::Output {
            pin: format!("gpio{}", config.heater_pin),
            source,
        })?;
    let heater = OutputController::new(gpio, config.heater_polarity)?;
    let probe = W1Therm::new(config.sensor_id.as_str())
        .map_err(|e| ThermostatError::SensorUnavailable(format!("{}: {}", config.sensor_id, e)))?;
    let reader = SensorReader::new(probe);

    runtime.block_on(async move {
        let mqtt = MqttClient::new(&config.mqtt);
        let outbound = Arc::new(Outbound::new(Arc::new(mqtt.client())));
        let thermostat = Arc::new(Thermostat::new(&config, heater, outbound, Box::new(store))?);

        let (tx, rx) = mpsc::channel(100);
        let mqtt_task = tokio::spawn(mqtt.run(tx));
        let mut pump = tokio::spawn(dispatch(ThermostatRouter::new(thermostat.clone()), rx));

        // Sensor reads and GPIO writes block, so the loop gets its own thread
        let cancel = CancellationToken::new();
        let control = ControlLoop::new(thermostat.clone(), reader);
        let control_thread = std::thread::Builder::new().name("control-loop".into()).spawn({
            let cancel = cancel.clone();
            move || control.run(cancel)
        })?;

        info!("MQTT thermostat {:?} is running, press Ctrl+C to exit", thermostat.name());
        tokio::select! {
            signal = signals.recv() => info!("Received {}, shutting down", signal),
            _ = cancel.cancelled() => {}
            _ = &mut pump => warn!("[MQTT] Event pump ended"),
        }
        cancel.cancel();

        let outcome = match tokio::task::spawn_blocking(move || control_thread.join()).await {
            Ok(Ok(result)) => result,
            _ => {
                error!("[Control] Control thread panicked");
                thermostat.shutdown()
            }
        };
        pump.abort();
        mqtt_task.abort();
        outcome
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_short_version_flag() {
        for flag in ["-v", "--version"] {
            let Err(err) = Cli::try_parse_from(["mqtt-thermostat", flag]) else {
                panic!("{} did not print the version", flag);
            };
            assert_eq!(err.kind(), ErrorKind::DisplayVersion);
        }
    }

    #[test]
    fn test_env_file_default() {
        let cli = Cli::try_parse_from(["mqtt-thermostat"]).unwrap();
        assert_eq!(cli.env_file, PathBuf::from(".env"));
    }
}
