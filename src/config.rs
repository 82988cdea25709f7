//! Configuration management.
//!
//! Settings come from an optional TOML file (via the `config` crate) with
//! command-line flags layered on top by the binary. The coordination core
//! never reads configuration itself — it consumes plain parameters resolved
//! here once at startup.

use crate::error::{DaqError, Result};
use crate::hardware::{SampleFormat, WireFormat};
use serde::Deserialize;
use std::path::Path;

/// Top-level application settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Control-channel parameters.
    pub mqtt: MqttSettings,
    /// Device bring-up parameters.
    pub device: DeviceSettings,
    /// Capture and persistence parameters.
    pub capture: CaptureSettings,
}

/// MQTT control-channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    /// Broker URL, `tcp://host:port`.
    pub server: String,
    /// Own ID used on MQTT and in file names.
    pub client_id: String,
    /// Topic to send responses/updates to.
    pub publish_topic: String,
    /// Topic to listen on for triggers.
    pub subscribe_topic: String,
    /// Reconnect attempts tolerated before the transport gives up.
    pub max_retries: u32,
}

/// Device bring-up settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Device address arguments.
    pub args: String,
    /// Clock/time reference source (`internal`, `external`, `mimo`).
    pub clock_reference: String,
    /// Receive channel index.
    pub channel: usize,
    /// Subdevice specification override.
    pub subdev: Option<String>,
}

/// Capture settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Prefix for save files; may include a directory.
    pub file_prefix: String,
    /// Samples per receive call.
    pub samples_per_buffer: usize,
    /// Sample encoding on the device link.
    pub wire_format: WireFormat,
    /// Sample encoding persisted to disk.
    pub data_format: SampleFormat,
    /// Slack for hardware setup operations, seconds.
    pub setup_slack: f64,
    /// Slack allowed between NTP and PPS-derived time, seconds.
    pub ntp_slack: f64,
    /// Tune with integer-N synthesis.
    pub integer_n: bool,
    /// When set, overrides the antenna named in each request.
    pub antenna_override: Option<String>,
    /// Run captures without persisting samples.
    pub null: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mqtt: MqttSettings::default(),
            device: DeviceSettings::default(),
            capture: CaptureSettings::default(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            server: "tcp://localhost:1883".to_string(),
            client_id: "tester".to_string(),
            publish_topic: "response".to_string(),
            subscribe_topic: "command".to_string(),
            max_retries: 5,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            args: String::new(),
            clock_reference: "external".to_string(),
            channel: 0,
            subdev: None,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            file_prefix: String::new(),
            samples_per_buffer: 10_000,
            wire_format: WireFormat::Sc16,
            data_format: SampleFormat::Sc16,
            setup_slack: 0.5,
            ntp_slack: 0.1,
            integer_n: false,
            antenna_override: None,
            null: false,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file; defaults when `path` is
    /// `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(DaqError::Config)?
            .try_deserialize()
            .map_err(DaqError::Config)?;
        Ok(settings)
    }

    /// Reject logically invalid values that pass parsing.
    pub fn validate(&self) -> Result<()> {
        if self.capture.samples_per_buffer == 0 {
            return Err(DaqError::Configuration(
                "samples_per_buffer must be positive".to_string(),
            ));
        }
        if self.capture.setup_slack < 0.0 || self.capture.ntp_slack < 0.0 {
            return Err(DaqError::Configuration(
                "slack durations must be non-negative".to_string(),
            ));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(DaqError::Configuration(
                "client_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
