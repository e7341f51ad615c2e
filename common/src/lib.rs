pub mod config;
pub mod error;
pub mod hysteresis;
pub mod types;

pub use config::{CoordinatorConfig, EdgeConfig};
pub use error::ValidationError;
pub use hysteresis::{decide, CompressorCommand};
pub use types::{
    Ack, CompressorConfig, ConfigAck, ConfigUpdate, ControlMode, CoordinatorStatus, ErrorBody,
    Measurement, ModeAck, ModeBody, ModeUpdate, Relay, RelayStateRecord, RelayStates,
    RelayWriteAck, SensorReading,
};
