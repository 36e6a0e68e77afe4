//! Configuration loading: TOML file, environment variables and command line.
//!
//! Looks for `sensortag.toml` in the working directory unless `--config`
//! names another file. Every field except the device address has a sensible
//! default so the file is optional. Environment variables take precedence
//! over file values, and command-line flags over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use sensortag_adapter_ble::{BleConfig, ConnectionLatency};
use sensortag_app::monitor::{
    DEFAULT_CONFIGURE_BACKOFF, DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY, MonitorConfig,
};
use sensortag_domain::address::DeviceAddress;
use sensortag_domain::sensor::SensorKind;

const DEFAULT_CONFIG_PATH: &str = "sensortag.toml";

/// Monitor a TI SensorTag and record its readings.
#[derive(Debug, Default, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Hardware address of the tag (e.g. `B0:B4:48:C9:4A:05`)
    #[arg(short = 'd', long = "dev")]
    pub device: Option<DeviceAddress>,

    /// Seconds between two polls [default: 120]
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Path of the metrics database [default: sensortag.db]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Adapter to use (e.g. `hci0`) [default: first adapter]
    #[arg(short, long)]
    pub adapter: Option<String>,

    /// Connection latency hint (low, medium, high)
    #[arg(long)]
    pub latency: Option<ConnectionLatency>,

    /// Configuration file [default: sensortag.toml]
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target tag.
    pub device: DeviceConfig,
    /// Polling and configuration timings.
    pub monitor: MonitorSection,
    /// BLE adapter settings.
    pub ble: BleConfig,
    /// Metrics database settings.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Target device configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hardware address of the tag.
    pub address: Option<DeviceAddress>,
}

/// Monitor timings and sensor selection.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub interval_secs: u64,
    /// Wait between enabling the sensors and reading them.
    pub settle_delay_ms: u64,
    /// Wait before retrying a failed sensor configuration.
    pub configure_backoff_ms: u64,
    /// Sensors to configure and poll.
    pub sensors: Vec<SensorKind>,
}

/// Metrics database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load the configuration file, then apply environment-variable and
    /// command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed, an override cannot be
    /// parsed, or the result fails validation.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::from_optional_file(Path::new(DEFAULT_CONFIG_PATH))?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    fn from_optional_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("SENSORTAG_DEVICE") {
            let address = val
                .parse()
                .map_err(|_| ConfigError::Validation(format!("invalid SENSORTAG_DEVICE {val:?}")))?;
            self.device.address = Some(address);
        }
        if let Some(val) = lookup("SENSORTAG_INTERVAL") {
            self.monitor.interval_secs = val.parse().map_err(|_| {
                ConfigError::Validation(format!("invalid SENSORTAG_INTERVAL {val:?}"))
            })?;
        }
        if let Some(val) = lookup("SENSORTAG_OUTPUT") {
            self.storage.path = PathBuf::from(val);
        }
        if let Some(val) = lookup("SENSORTAG_ADAPTER") {
            self.ble.adapter = Some(val);
        }
        if let Some(val) = lookup("SENSORTAG_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(address) = args.device {
            self.device.address = Some(address);
        }
        if let Some(interval) = args.interval {
            self.monitor.interval_secs = interval;
        }
        if let Some(output) = &args.output {
            self.storage.path.clone_from(output);
        }
        if let Some(adapter) = &args.adapter {
            self.ble.adapter = Some(adapter.clone());
        }
        if let Some(latency) = args.latency {
            self.ble.connection_latency = latency;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.device.address.is_none() {
            return Err(ConfigError::Validation(
                "device address is required (--dev)".to_string(),
            ));
        }
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if Duration::from_millis(self.monitor.settle_delay_ms) >= self.poll_interval() {
            return Err(ConfigError::Validation(
                "settle delay must be shorter than the poll interval".to_string(),
            ));
        }
        if self.monitor.configure_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "configure backoff must be non-zero".to_string(),
            ));
        }
        if self.monitor.sensors.is_empty() {
            return Err(ConfigError::Validation(
                "at least one sensor must be monitored".to_string(),
            ));
        }
        if self.ble.operation_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "BLE operation timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    /// Build the monitor's runtime parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if no device address is configured.
    pub fn monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let target = self.device.address.ok_or_else(|| {
            ConfigError::Validation("device address is required (--dev)".to_string())
        })?;
        let mut sensors = self.monitor.sensors.clone();
        sensors.dedup();

        Ok(MonitorConfig {
            adapter: self.ble.adapter.clone(),
            poll_interval: self.poll_interval(),
            settle_delay: Duration::from_millis(self.monitor.settle_delay_ms),
            configure_backoff: Duration::from_millis(self.monitor.configure_backoff_ms),
            sensors,
            ..MonitorConfig::new(target)
        })
    }
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            settle_delay_ms: millis(DEFAULT_SETTLE_DELAY),
            configure_backoff_ms: millis(DEFAULT_CONFIGURE_BACKOFF),
            sensors: SensorKind::ALL.to_vec(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sensortag.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "sensortag=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
