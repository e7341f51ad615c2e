//! Ports to the probe set and the relay board, plus host stand-ins.
//!
//! Real one-wire/DHT drivers and GPIO output plug in behind these traits.

use chiller_common::{Relay, RelayStates, SensorReading};
use tracing::info;

pub trait MeasurementSource: Send {
    /// `None` when any probe failed to produce a value this round.
    fn read(&mut self) -> Option<SensorReading>;
}

pub trait RelayActuator: Send {
    fn set(&mut self, relay: Relay, on: bool);

    /// Last commanded level of every output.
    fn states(&self) -> RelayStates;

    fn apply(&mut self, states: RelayStates) {
        for relay in Relay::ALL {
            self.set(relay, states.get(relay));
        }
    }

    fn force_off(&mut self, relays: &[Relay]) {
        for relay in relays {
            self.set(*relay, false);
        }
    }
}

/// Synthetic probe: the compressor probe sweeps 2.5..5.5 °C so the default
/// thresholds are crossed in both directions.
#[derive(Debug, Default)]
pub struct SimulatedProbe {
    reads: u64,
    dropout_every: Option<u64>,
}

impl SimulatedProbe {
    pub fn new(dropout_every: Option<u64>) -> Self {
        Self {
            reads: 0,
            dropout_every: dropout_every.filter(|every| *every > 0),
        }
    }
}

impl MeasurementSource for SimulatedProbe {
    fn read(&mut self) -> Option<SensorReading> {
        self.reads = self.reads.saturating_add(1);
        if let Some(every) = self.dropout_every {
            if self.reads % every == 0 {
                return None;
            }
        }

        let phase = (self.reads % 40) as f32;
        let probe = if phase < 20.0 {
            2.5 + phase * 0.15
        } else {
            5.5 - (phase - 20.0) * 0.15
        };

        Some(SensorReading {
            temp_dht22: 21.0 + ((self.reads % 8) as f32 * 0.2),
            humidity: 45.0 + ((self.reads % 6) as f32 * 0.5),
            temp_ds18b20: probe,
        })
    }
}

/// Keeps levels in memory and logs each change; GPIO output hooks in here.
#[derive(Debug, Default)]
pub struct LoggingRelays {
    states: RelayStates,
}

impl RelayActuator for LoggingRelays {
    fn set(&mut self, relay: Relay, on: bool) {
        if self.states.get(relay) != on {
            info!("relay {relay} -> {}", if on { "ON" } else { "OFF" });
        }
        self.states.set(relay, on);
    }

    fn states(&self) -> RelayStates {
        self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_probe_crosses_default_band() {
        let mut probe = SimulatedProbe::new(None);
        let temps: Vec<f32> = (0..40)
            .filter_map(|_| probe.read())
            .map(|reading| reading.temp_ds18b20)
            .collect();

        assert_eq!(temps.len(), 40);
        assert!(temps.iter().any(|temp| *temp > 4.5));
        assert!(temps.iter().any(|temp| *temp < 3.5));
    }

    #[test]
    fn simulated_probe_drops_out_on_schedule() {
        let mut probe = SimulatedProbe::new(Some(3));
        let results: Vec<bool> = (0..6).map(|_| probe.read().is_some()).collect();
        assert_eq!(results, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn force_off_only_touches_listed_relays() {
        let mut relays = LoggingRelays::default();
        relays.apply(RelayStates {
            relay1: true,
            relay2: true,
            relay3: true,
        });

        relays.force_off(&Relay::MANUAL);

        assert_eq!(
            relays.states(),
            RelayStates {
                relay1: true,
                relay2: false,
                relay3: false,
            }
        );
    }
}
