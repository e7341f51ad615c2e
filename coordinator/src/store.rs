//! Authoritative coordinator state.
//!
//! Each entity sits behind its own lock. The relay record's compare-and-replace
//! runs entirely under its mutex so concurrent writers cannot interleave; there
//! is no transaction spanning entities.

use chiller_common::{
    CompressorConfig, ConfigUpdate, ControlMode, CoordinatorStatus, Measurement, ModeUpdate,
    RelayStateRecord, SensorReading, ValidationError,
};
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Result of a relay-state write. Callers over HTTP only see whether it was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayWrite {
    Accepted,
    Stale { stored: u64 },
    ModeMismatch { configured: ControlMode },
}

impl RelayWrite {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

#[derive(Debug)]
pub struct CoordinatorStore {
    relay_state: Mutex<RelayStateRecord>,
    measurement: RwLock<Measurement>,
    mode: RwLock<ControlMode>,
    config: RwLock<CompressorConfig>,
}

impl Default for CoordinatorStore {
    fn default() -> Self {
        Self {
            relay_state: Mutex::new(RelayStateRecord::default()),
            measurement: RwLock::new(Measurement::default()),
            mode: RwLock::new(ControlMode::Auto),
            config: RwLock::new(CompressorConfig::default()),
        }
    }
}

impl CoordinatorStore {
    pub async fn relay_state(&self) -> RelayStateRecord {
        *self.relay_state.lock().await
    }

    /// Replaces the record only for a strictly newer timestamp tagged with the
    /// currently configured mode.
    pub async fn set_relay_state(&self, candidate: RelayStateRecord) -> RelayWrite {
        let mut stored = self.relay_state.lock().await;
        let configured = *self.mode.read().await;

        let outcome = if candidate.timestamp <= stored.timestamp {
            RelayWrite::Stale {
                stored: stored.timestamp,
            }
        } else if candidate.mode != configured {
            RelayWrite::ModeMismatch { configured }
        } else {
            *stored = candidate;
            RelayWrite::Accepted
        };

        match outcome {
            RelayWrite::Accepted => info!(
                "relay state accepted: ts={} mode={} {:?}",
                candidate.timestamp, candidate.mode, candidate.relays
            ),
            rejected => debug!(
                "relay state dropped: ts={} mode={} ({rejected:?})",
                candidate.timestamp, candidate.mode
            ),
        }
        outcome
    }

    pub async fn measurement(&self) -> Measurement {
        *self.measurement.read().await
    }

    /// Overwrites the latest reading, stamped with coordinator receipt time.
    pub async fn set_measurement(&self, reading: SensorReading) -> Measurement {
        let measurement = Measurement {
            reading,
            timestamp: Some(Utc::now()),
        };
        *self.measurement.write().await = measurement;
        debug!("measurement received: {reading:?}");
        measurement
    }

    pub async fn mode(&self) -> ControlMode {
        *self.mode.read().await
    }

    pub async fn set_mode(&self, update: &ModeUpdate) -> Result<ControlMode, ValidationError> {
        let mode = update.parse()?;
        let mut current = self.mode.write().await;
        if *current != mode {
            info!("control mode set to {mode}");
        }
        *current = mode;
        Ok(mode)
    }

    pub async fn config(&self) -> CompressorConfig {
        *self.config.read().await
    }

    pub async fn set_config(
        &self,
        update: ConfigUpdate,
    ) -> Result<CompressorConfig, ValidationError> {
        let config = CompressorConfig::try_from(update)?;
        *self.config.write().await = config;
        info!(
            "compressor config updated: start={} stop={}",
            config.start, config.stop
        );
        Ok(config)
    }

    pub async fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            mode: self.mode().await,
            relays: self.relay_state().await,
            measurements: self.measurement().await,
            config: self.config().await,
        }
    }
}
