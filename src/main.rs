//! Sensor adapter - main entry point
//!
//! Simulates a telemetry device: waits for its broker binding, exchanges its
//! device code for an access token, then publishes a reading every interval.

use clap::Parser;
use sensor_adapter::auth::{OAuthConfig, OAuthDeviceCodeProvider};
use sensor_adapter::config::{ConfigError, DeviceConfig};
use sensor_adapter::device::{DeviceLifecycle, InvocationParams, ParamsError};
use sensor_adapter::error::{DeviceResult, FaultKind};
use sensor_adapter::observability::init_default_logging;
use sensor_adapter::telemetry::LoopExit;
use sensor_adapter::transport::MqttConnector;
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Configuration files tried when `--config` is not given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["sensor-adapter.toml", "config/sensor-adapter.toml"];

/// OAuth-authenticated MQTT telemetry device
#[derive(Parser)]
#[command(name = "sensor-adapter")]
#[command(about = "Publishes simulated sensor readings to a discovered MQTT broker")]
#[command(version)]
struct Cli {
    /// JSON array of {"name", "value"} parameters; must include device_code
    #[arg(value_name = "PARAMS", required_unless_present = "show_config")]
    params: Option<String>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory the binding file appears in (defaults to the current directory)
    #[arg(short, long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Stop after publishing this many readings
    #[arg(long, value_name = "N")]
    max_cycles: Option<u64>,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting sensor adapter");

    let exit_code = match run(cli).await {
        Ok(Some(exit)) => {
            info!(cycles = exit.cycles(), outcome = ?exit, "Sensor adapter finished");
            0
        }
        Ok(None) => 0,
        Err(e) => {
            let code = e.exit_code();
            match e.fault_kind() {
                FaultKind::Shutdown => info!(reason = %e, "Sensor adapter stopped"),
                _ => error!(error = %e.sanitized_message(), exit_code = code, "Sensor adapter failed"),
            }
            code
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> DeviceResult<Option<LoopExit>> {
    let mut config = load_configuration(cli.config.as_deref())?;
    if let Some(max_cycles) = cli.max_cycles {
        config.telemetry.max_cycles = Some(max_cycles);
    }
    config.validate()?;

    if cli.show_config {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::InvalidConfig(format!("cannot render configuration: {e}")))?;
        println!("{rendered}");
        return Ok(None);
    }

    let params = InvocationParams::parse(cli.params.as_deref().ok_or(ParamsError::MissingDeviceCode)?)?;
    let device_code = params.device_code()?;

    let working_dir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(ConfigError::FileRead)?,
    };

    let provider = OAuthDeviceCodeProvider::new(OAuthConfig::from(&config.auth))?;
    let connector = MqttConnector::from_config(&config);
    let shutdown_rx = spawn_shutdown_listener();

    let mut lifecycle = DeviceLifecycle::new(&config, provider, connector, device_code, working_dir);
    lifecycle.run(shutdown_rx).await.map(Some)
}

fn load_configuration(config_path: Option<&Path>) -> Result<DeviceConfig, ConfigError> {
    if let Some(path) = config_path {
        info!(path = %path.display(), "Loading configuration");
        return DeviceConfig::load_from_file(path);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            info!(path = %path.display(), "Loading configuration");
            return DeviceConfig::load_from_file(path);
        }
    }

    info!("No configuration file found, using built-in defaults");
    Ok(DeviceConfig::default())
}

/// Flip the shutdown channel on SIGINT or SIGTERM
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                info!(signal = name, "Received signal, shutting down gracefully");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Signal handlers unavailable; run until the device stops");
                std::future::pending::<()>().await;
            }
        }
    });

    shutdown_rx
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}
