//! Startup configuration, read once from `conf.json`.
//!
//! Key names follow the files already deployed on the nodes
//! (`BasicVerbose`, `MqttAddress`, ...).

use crate::publisher::AlertFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "conf.json";
pub const DEFAULT_CLIENT_ID: &str = "rpi-client";
pub const DEFAULT_SPI_DEVICE: &str = "/dev/spidev1.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// What to do when a single channel read fails mid-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFailurePolicy {
    /// Stop the process.
    #[default]
    Abort,
    /// Drop the channel from this cycle and carry on.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Configuration {
    pub basic_verbose: bool,
    pub basic_logger: bool,
    /// Seconds between scheduled cycles; 0 runs cycles back to back.
    pub basic_timer: u64,
    pub mqtt_address: String,
    pub mqtt_topic: String,
    pub device_name: Option<String>,
    pub client_id: String,
    pub spi_device: String,
    pub alert_format: AlertFormat,
    pub read_failure: ReadFailurePolicy,
    pub qos: u8,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            basic_verbose: false,
            basic_logger: false,
            basic_timer: 0,
            mqtt_address: "127.0.0.1:1883".to_string(),
            mqtt_topic: "meter".to_string(),
            device_name: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            spi_device: DEFAULT_SPI_DEVICE.to_string(),
            alert_format: AlertFormat::Json,
            read_failure: ReadFailurePolicy::Abort,
            qos: 0,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub verbose: bool,
    pub logger: bool,
    pub timer_seconds: Option<u64>,
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt_topic.is_empty() {
            return Err(ConfigError::Invalid("MqttTopic must not be empty"));
        }
        if self.mqtt_address.is_empty() {
            return Err(ConfigError::Invalid("MqttAddress must not be empty"));
        }
        if self.qos > 2 {
            return Err(ConfigError::Invalid("Qos must be 0, 1 or 2"));
        }
        Ok(())
    }

    /// Flags can only switch verbose/logger on, matching the file default
    /// being the flag default.
    pub fn apply(&mut self, overrides: &Overrides) {
        self.basic_verbose |= overrides.verbose;
        self.basic_logger |= overrides.logger;
        if let Some(seconds) = overrides.timer_seconds {
            self.basic_timer = seconds;
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        (self.basic_timer > 0).then(|| Duration::from_secs(self.basic_timer))
    }

    /// Configured name, else the kernel hostname.
    pub fn resolve_device_name(&self) -> String {
        if let Some(name) = self.device_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_owned();
        }
        std::fs::read_to_string("/proc/sys/kernel/hostname")
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
