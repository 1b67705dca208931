//! System configuration.
//!
//! Site-specific values (identity, credentials, broker, calibration) come
//! from a JSON document loaded at boot.  Tuning constants that only change
//! with the hardware live in the `Default` impls below.

use core::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Maximum SSID length accepted by the radio.
pub const SSID_MAX_LEN: usize = 32;

/// SSID used when the document does not name one.
pub const DEFAULT_SSID: &str = "eduroam";

// ---------------------------------------------------------------------------
// Raw document
// ---------------------------------------------------------------------------

/// The configuration document exactly as stored.  Every field is optional
/// here; [`RawConfig::validate`] decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    pub device_id: Option<String>,
    pub wifi_user: Option<String>,
    pub wifi_pass: Option<String>,
    pub mqtt_server: Option<String>,
    pub mqtt_port: Option<u16>,
    pub flow_k: Option<f32>,
    pub flow_correct_k: Option<f32>,
    pub flow_window: Option<usize>,
    pub wifi_ssid: Option<String>,
    pub ec_k_value: Option<f32>,
    pub publish_interval_ms: Option<u64>,
    pub publish_smoothing: Option<Smoothing>,
}

/// How the publisher reduces the readings collected between publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    /// Running mean of every sample since the last successful publish.
    #[default]
    Mean,
    /// Most recent sample only.
    Latest,
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub wifi_ssid: heapless::String<SSID_MAX_LEN>,
    pub wifi_user: String,
    pub wifi_pass: String,
    pub mqtt_server: String,
    pub mqtt_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowCalibration {
    /// Pulses per second per L/min divisor (sensor datasheet K factor).
    pub flow_k: f32,
    /// Site correction applied after `flow_k`.
    pub flow_correct_k: f32,
    /// Rolling window length; 1 publishes raw readings.
    pub window: usize,
}

impl Default for FlowCalibration {
    fn default() -> Self {
        Self {
            flow_k: 1.0,
            flow_correct_k: 1.0,
            window: 1,
        }
    }
}

/// Stirrer speed controller and actuator scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorTuning {
    pub max_rpm: f32,
    /// Output that holds the motor still; the H-bridge speed byte is
    /// centred here.
    pub mid_output: f32,
    pub max_output: f32,
    pub kp: f32,
    pub ki: f32,
    /// Measured speeds above this are treated as encoder glitches.
    pub plausible_rpm: f32,
    /// Full-scale rpm of the stirrer angle knob.
    pub knob_full_scale_rpm: u32,
    /// Full-scale power of the pump angle knob.
    pub knob_full_scale_power: u32,
}

impl Default for MotorTuning {
    fn default() -> Self {
        Self {
            max_rpm: 120.0,
            mid_output: 127.0,
            max_output: 255.0,
            kp: 1.4,
            ki: 0.1,
            plausible_rpm: 100_000.0,
            knob_full_scale_rpm: 150,
            knob_full_scale_power: 255,
        }
    }
}

/// Poll periods of the device and control tasks (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub angle_ms: u64,
    pub conductivity_ms: u64,
    pub flow_ms: u64,
    pub encoder_ms: u64,
    pub thermocouple_ms: u64,
    pub motor_ms: u64,
    pub command_ms: u64,
    pub publish_ms: u64,
    pub event_log_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            angle_ms: 100,
            conductivity_ms: 100,
            flow_ms: 500,
            encoder_ms: 100,
            thermocouple_ms: 1000,
            motor_ms: 100,
            command_ms: 500,
            publish_ms: 2000,
            event_log_ms: 1000,
        }
    }
}

/// Association and broker retry behaviour (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTiming {
    /// Status poll while an association attempt is in flight.
    pub associating_poll_ms: u64,
    /// Link check while associated.
    pub associated_poll_ms: u64,
    /// An attempt unresolved after this long has failed.
    pub association_timeout_ms: u64,
    /// First retry delay after a failed attempt.
    pub retry_base_ms: u64,
    /// Upper bound for the doubling retry delay.
    pub retry_max_ms: u64,
    pub broker_ms: u64,
    /// A broker connect not answered within this long has failed.
    pub broker_connect_timeout_ms: u64,
}

impl Default for NetworkTiming {
    fn default() -> Self {
        Self {
            associating_poll_ms: 100,
            associated_poll_ms: 1000,
            association_timeout_ms: 30_000,
            retry_base_ms: 60_000,
            retry_max_ms: 300_000,
            broker_ms: 1000,
            broker_connect_timeout_ms: 5000,
        }
    }
}

/// Everything the firmware assembly needs, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub device_id: String,
    pub network: NetworkConfig,
    pub flow: FlowCalibration,
    /// Conductivity probe cell constant.
    pub ec_k_value: f32,
    pub publish_smoothing: Smoothing,
    pub motor: MotorTuning,
    pub timing: Timing,
    pub net_timing: NetworkTiming,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The document is not valid JSON or a field has the wrong type.
    Malformed(String),
    /// The document parsed but was rejected.
    Rejected(Error),
}

impl ConfigError {
    /// Key whose absence caused the rejection, if any.
    pub fn missing_key(&self) -> Option<&'static str> {
        match *self {
            Self::Rejected(Error::ConfigurationMissing(key)) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "config: malformed document: {msg}"),
            Self::Rejected(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl From<Error> for ConfigError {
    fn from(e: Error) -> Self {
        Self::Rejected(e)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn required(value: Option<String>, key: &'static str) -> Result<String, Error> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::ConfigurationMissing(key)),
    }
}

/// Positive finite factor, or `default` with a warning.
fn factor(value: Option<f32>, key: &str, default: f32) -> f32 {
    match value {
        None => default,
        Some(v) if v.is_finite() && v > 0.0 => v,
        Some(v) => {
            warn!("Config: {} = {} is not a positive number, using {}", key, v, default);
            default
        }
    }
}

impl RawConfig {
    /// Check required keys and apply defaults.
    pub fn validate(self) -> Result<SystemConfig, Error> {
        let device_id = required(self.device_id, "deviceId")?;
        let wifi_user = required(self.wifi_user, "wifiUser")?;
        let wifi_pass = required(self.wifi_pass, "wifiPass")?;
        let mqtt_server = required(self.mqtt_server, "mqttServer")?;
        let mqtt_port = self
            .mqtt_port
            .filter(|&p| p != 0)
            .ok_or(Error::ConfigurationMissing("mqttPort"))?;

        let ssid_text = self.wifi_ssid.unwrap_or_else(|| DEFAULT_SSID.to_owned());
        let wifi_ssid = match heapless::String::try_from(ssid_text.as_str()) {
            Ok(s) if !ssid_text.is_empty() => s,
            _ => {
                warn!("Config: wifiSsid '{}' unusable, using '{}'", ssid_text, DEFAULT_SSID);
                heapless::String::try_from(DEFAULT_SSID).unwrap_or_default()
            }
        };

        let defaults = FlowCalibration::default();
        let flow = FlowCalibration {
            flow_k: factor(self.flow_k, "flowK", defaults.flow_k),
            flow_correct_k: factor(self.flow_correct_k, "flowCorrectK", defaults.flow_correct_k),
            window: self.flow_window.unwrap_or(defaults.window).max(1),
        };

        let mut timing = Timing::default();
        if let Some(ms) = self.publish_interval_ms.filter(|&ms| ms > 0) {
            timing.publish_ms = ms;
        }

        Ok(SystemConfig {
            device_id,
            network: NetworkConfig {
                wifi_ssid,
                wifi_user,
                wifi_pass,
                mqtt_server,
                mqtt_port,
            },
            flow,
            ec_k_value: factor(self.ec_k_value, "ecKValue", 1.0),
            publish_smoothing: self.publish_smoothing.unwrap_or_default(),
            motor: MotorTuning::default(),
            timing,
            net_timing: NetworkTiming::default(),
        })
    }
}

impl SystemConfig {
    /// Parse and validate a configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Ok(raw.validate()?)
    }
}
