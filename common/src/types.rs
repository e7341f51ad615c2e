use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

pub const CONFIG_MIN_TEMP: f64 = 0.0;
pub const CONFIG_MAX_TEMP: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Auto,
    Manual,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(ValidationError::InvalidMode(other.to_string())),
        }
    }
}

/// The three switched outputs. `Compressor` is the only one the hysteresis loop drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relay {
    Compressor,
    Aux1,
    Aux2,
}

impl Relay {
    pub const ALL: [Relay; 3] = [Relay::Compressor, Relay::Aux1, Relay::Aux2];
    /// Outputs only an operator switches; forced off when the coordinator is lost.
    pub const MANUAL: [Relay; 2] = [Relay::Aux1, Relay::Aux2];

    pub fn key(self) -> &'static str {
        match self {
            Self::Compressor => "relay1",
            Self::Aux1 => "relay2",
            Self::Aux2 => "relay3",
        }
    }
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Relay levels travel as `0`/`1`; booleans are accepted on input too.
mod on_off {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Level(u64),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Flag(flag) => Ok(flag),
            Raw::Level(0) => Ok(false),
            Raw::Level(1) => Ok(true),
            Raw::Level(other) => Err(de::Error::custom(format!(
                "relay level must be 0 or 1, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayStates {
    #[serde(with = "on_off")]
    pub relay1: bool,
    #[serde(with = "on_off")]
    pub relay2: bool,
    #[serde(with = "on_off")]
    pub relay3: bool,
}

impl RelayStates {
    pub const ALL_OFF: RelayStates = RelayStates {
        relay1: false,
        relay2: false,
        relay3: false,
    };

    pub fn get(&self, relay: Relay) -> bool {
        match relay {
            Relay::Compressor => self.relay1,
            Relay::Aux1 => self.relay2,
            Relay::Aux2 => self.relay3,
        }
    }

    pub fn set(&mut self, relay: Relay, on: bool) {
        match relay {
            Relay::Compressor => self.relay1 = on,
            Relay::Aux1 => self.relay2 = on,
            Relay::Aux2 => self.relay3 = on,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStateRecord {
    #[serde(flatten)]
    pub relays: RelayStates,
    /// Milliseconds; only compared against the coordinator's previously accepted value.
    pub timestamp: u64,
    pub mode: ControlMode,
}

impl Default for RelayStateRecord {
    fn default() -> Self {
        Self {
            relays: RelayStates {
                relay1: false,
                relay2: true,
                relay3: true,
            },
            timestamp: 0,
            mode: ControlMode::Auto,
        }
    }
}

/// One read of the probe set: air temperature, humidity and the probe the compressor follows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    pub temp_dht22: f32,
    pub humidity: f32,
    pub temp_ds18b20: f32,
}

impl SensorReading {
    pub fn is_complete(&self) -> bool {
        self.temp_dht22.is_finite() && self.humidity.is_finite() && self.temp_ds18b20.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(flatten)]
    pub reading: SensorReading,
    /// Receipt time at the coordinator, not the device read time.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorConfig {
    #[serde(rename = "temp_start_compressor")]
    pub start: f32,
    #[serde(rename = "temp_stop_compressor")]
    pub stop: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            start: 4.5,
            stop: 3.5,
        }
    }
}

impl CompressorConfig {
    /// Accepts only `0 <= stop < start <= 50`, checked again on the stored `f32`
    /// values so two distinct inputs cannot collapse into an empty band.
    pub fn new(start: f64, stop: f64) -> Result<Self, ValidationError> {
        let config = Self {
            start: start as f32,
            stop: stop as f32,
        };
        let in_range = CONFIG_MIN_TEMP <= stop && stop < start && start <= CONFIG_MAX_TEMP;
        if !in_range || config.stop >= config.start {
            return Err(ValidationError::ConfigOutOfRange { start, stop });
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::new(f64::from(self.start), f64::from(self.stop)).map(|_| ())
    }
}

/// Raw `POST /api/config` body; numbers are checked before the range.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub temp_start_compressor: Option<Value>,
    #[serde(default)]
    pub temp_stop_compressor: Option<Value>,
}

impl TryFrom<ConfigUpdate> for CompressorConfig {
    type Error = ValidationError;

    fn try_from(update: ConfigUpdate) -> Result<Self, Self::Error> {
        let start = update.temp_start_compressor.as_ref().and_then(Value::as_f64);
        let stop = update.temp_stop_compressor.as_ref().and_then(Value::as_f64);
        match (start, stop) {
            (Some(start), Some(stop)) => Self::new(start, stop),
            _ => Err(ValidationError::NonNumericConfig),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeBody {
    pub mode: ControlMode,
}

/// Raw `POST /api/mode` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModeUpdate {
    #[serde(default)]
    pub mode: Option<Value>,
}

impl ModeUpdate {
    pub fn parse(&self) -> Result<ControlMode, ValidationError> {
        match &self.mode {
            Some(Value::String(value)) => value.parse(),
            Some(other) => Err(ValidationError::InvalidMode(other.to_string())),
            None => Err(ValidationError::InvalidMode("null".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayWriteAck {
    pub status: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeAck {
    pub status: String,
    pub mode: ControlMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigAck {
    pub status: String,
    pub config: CompressorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub mode: ControlMode,
    pub relays: RelayStateRecord,
    pub measurements: Measurement,
    pub config: CompressorConfig,
}
