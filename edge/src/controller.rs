//! Edge control loop.
//!
//! One `tick` reads the probes, keeps the session with the coordinator alive,
//! applies hysteresis or the coordinator's relay targets, and runs the slower
//! upload/save cadences. Every coordinator call is bounded by the client's
//! timeout and a failure never aborts the tick.

use chiller_common::{
    CompressorConfig, ControlMode, EdgeConfig, Relay, RelayStateRecord, RelayStates,
    SensorReading,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    client::{CoordinatorApi, SyncError},
    hardware::{MeasurementSource, RelayActuator},
    snapshot::SnapshotStore,
};

/// Applied in manual mode when the coordinator answers the relay pull with an error status.
const MANUAL_FALLBACK: RelayStates = RelayStates {
    relay1: true,
    relay2: false,
    relay3: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeState {
    Initializing,
    Auto,
    Manual,
    /// Coordinator unreachable: manual outputs forced off, compressor regulated locally.
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    SensorUnavailable,
    Ran(EdgeState),
}

#[derive(Debug, Clone, Copy)]
struct Cadence {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl Cadence {
    fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// Due on first use, then once per interval. Marks itself as run.
    fn due(&mut self, now_ms: u64) -> bool {
        match self.last_ms {
            Some(last) if now_ms.saturating_sub(last) < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }
}

pub struct EdgeController<C, S, R> {
    coordinator: C,
    sensor: S,
    relays: R,
    snapshots: SnapshotStore,

    state: EdgeState,
    mode: ControlMode,
    working_config: CompressorConfig,
    announce_pending: bool,
    last_pushed_ts: u64,

    mode_check: Cadence,
    upload: Cadence,
    save: Cadence,
}

impl<C, S, R> EdgeController<C, S, R>
where
    C: CoordinatorApi,
    S: MeasurementSource,
    R: RelayActuator,
{
    pub fn new(
        coordinator: C,
        sensor: S,
        relays: R,
        snapshots: SnapshotStore,
        config: &EdgeConfig,
        working_config: CompressorConfig,
    ) -> Self {
        Self {
            coordinator,
            sensor,
            relays,
            snapshots,
            state: EdgeState::Initializing,
            mode: ControlMode::Auto,
            working_config,
            announce_pending: true,
            last_pushed_ts: 0,
            mode_check: Cadence::new(config.mode_check_interval_ms),
            upload: Cadence::new(config.upload_interval_ms),
            save: Cadence::new(config.save_interval_ms),
        }
    }

    pub fn state(&self) -> EdgeState {
        self.state
    }

    pub async fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let Some(reading) = self.sensor.read().filter(SensorReading::is_complete) else {
            debug!("sensor reading unavailable, skipping tick");
            return TickOutcome::SensorUnavailable;
        };

        if self.mode_check.due(now_ms) {
            self.check_mode().await;
        }

        if self.announce_pending && self.session_up() {
            self.announce_config().await;
        }

        match self.state {
            EdgeState::Auto => self.run_auto(&reading).await,
            EdgeState::Manual => self.run_manual().await,
            EdgeState::Emergency => {
                self.regulate_compressor(&reading);
            }
            EdgeState::Initializing => {}
        }

        if self.upload.due(now_ms) {
            self.upload_measurement(&reading).await;
        }

        if self.save.due(now_ms) {
            if let Err(err) = self.snapshots.save(&self.working_config).await {
                warn!("failed to save local snapshot: {err:#}");
            }
        }

        TickOutcome::Ran(self.state)
    }

    /// Leaves every output off; called once on process shutdown.
    pub fn shutdown(&mut self) {
        self.relays.apply(RelayStates::ALL_OFF);
        info!("relays released");
    }

    fn session_up(&self) -> bool {
        matches!(self.state, EdgeState::Auto | EdgeState::Manual)
    }

    async fn check_mode(&mut self) {
        match self.coordinator.fetch_mode().await {
            Ok(mode) => {
                if self.state == EdgeState::Emergency {
                    info!("coordinator reachable again, leaving emergency");
                }
                if mode != self.mode || !self.session_up() {
                    info!("mode: {mode}");
                }
                self.mode = mode;
                self.state = match mode {
                    ControlMode::Auto => EdgeState::Auto,
                    ControlMode::Manual => EdgeState::Manual,
                };
            }
            Err(err) => {
                warn!("mode check failed: {err}");
                self.enter_emergency();
            }
        }
    }

    fn enter_emergency(&mut self) {
        self.relays.force_off(&Relay::MANUAL);
        if self.state != EdgeState::Emergency {
            warn!("entering emergency, manual outputs forced off");
        }
        self.state = EdgeState::Emergency;
        self.announce_pending = true;
    }

    async fn announce_config(&mut self) {
        match self.coordinator.announce_config(&self.working_config).await {
            Ok(()) => {
                self.announce_pending = false;
                info!(
                    "announced config start={} stop={}",
                    self.working_config.start, self.working_config.stop
                );
            }
            Err(err) => warn!("config announce failed, retrying next tick: {err}"),
        }
    }

    async fn run_auto(&mut self, reading: &SensorReading) {
        match self.coordinator.fetch_config().await {
            Ok(config) if config.validate().is_err() => {
                warn!("ignoring invalid thresholds start={} stop={}", config.start, config.stop);
            }
            Ok(config) => {
                if config != self.working_config {
                    info!("thresholds updated: start={} stop={}", config.start, config.stop);
                    self.working_config = config;
                }
            }
            Err(err) => warn!("config fetch failed, using cached thresholds: {err}"),
        }

        if self.regulate_compressor(reading) {
            self.push_relay_state().await;
        }
    }

    /// Returns whether the hysteresis produced a definite command.
    fn regulate_compressor(&mut self, reading: &SensorReading) -> bool {
        let command = self.working_config.decide(reading.temp_ds18b20);
        if !command.is_definite() {
            debug!("probe {:.2} inside dead band, holding", reading.temp_ds18b20);
            return false;
        }

        let current = self.relays.states().get(Relay::Compressor);
        self.relays.set(Relay::Compressor, command.resolve(current));
        true
    }

    async fn push_relay_state(&mut self) {
        let record = RelayStateRecord {
            relays: self.relays.states(),
            timestamp: self.next_timestamp(),
            mode: ControlMode::Auto,
        };

        match self.coordinator.push_relay_state(&record).await {
            Ok(true) => debug!("relay state synced: {record:?}"),
            Ok(false) => debug!("coordinator kept its relay state over ts={}", record.timestamp),
            Err(err) => warn!("failed to sync relay states: {err}"),
        }
    }

    /// Local wall clock in ms, bumped so pushes from this process strictly increase.
    fn next_timestamp(&mut self) -> u64 {
        let wall = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let timestamp = wall.max(self.last_pushed_ts.saturating_add(1));
        self.last_pushed_ts = timestamp;
        timestamp
    }

    async fn run_manual(&mut self) {
        match self.coordinator.fetch_relay_state().await {
            Ok(record) => self.relays.apply(record.relays),
            Err(SyncError::Status(status)) => {
                warn!("coordinator returned {status} for relay state, applying fallback");
                self.relays.apply(MANUAL_FALLBACK);
            }
            Err(err) => warn!("relay state pull failed, holding outputs: {err}"),
        }
    }

    async fn upload_measurement(&mut self, reading: &SensorReading) {
        match self.coordinator.upload_measurement(reading).await {
            Ok(()) => debug!("sensor data sent: {reading:?}"),
            Err(err) => warn!("failed to upload sensor data: {err}"),
        }
    }
}
