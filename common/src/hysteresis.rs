use crate::types::CompressorConfig;

/// Outcome of one hysteresis evaluation for the compressor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorCommand {
    On,
    Off,
    /// Inside the dead band: keep whatever was last commanded.
    Hold,
}

impl CompressorCommand {
    /// Folds the command onto the currently commanded output.
    pub fn resolve(self, current_on: bool) -> bool {
        match self {
            Self::On => true,
            Self::Off => false,
            Self::Hold => current_on,
        }
    }

    pub fn is_definite(self) -> bool {
        !matches!(self, Self::Hold)
    }
}

/// Dead-band decision. A NaN reading never compares true, so it holds.
pub fn decide(temp: f32, start: f32, stop: f32) -> CompressorCommand {
    if temp > start {
        CompressorCommand::On
    } else if temp < stop {
        CompressorCommand::Off
    } else {
        CompressorCommand::Hold
    }
}

impl CompressorConfig {
    pub fn decide(&self, temp: f32) -> CompressorCommand {
        decide(temp, self.start, self.stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn above_start_turns_compressor_on() {
        assert_eq!(decide(5.0, 4.5, 3.5), CompressorCommand::On);
    }

    #[test]
    fn below_stop_turns_compressor_off() {
        assert_eq!(decide(3.0, 4.5, 3.5), CompressorCommand::Off);
    }

    #[test]
    fn dead_band_holds_including_edges() {
        assert_eq!(decide(4.0, 4.5, 3.5), CompressorCommand::Hold);
        assert_eq!(decide(4.5, 4.5, 3.5), CompressorCommand::Hold);
        assert_eq!(decide(3.5, 4.5, 3.5), CompressorCommand::Hold);
    }

    #[test]
    fn hold_keeps_prior_commanded_state() {
        let hold = decide(4.0, 4.5, 3.5);
        assert!(hold.resolve(true));
        assert!(!hold.resolve(false));
        assert!(!hold.is_definite());

        assert!(CompressorCommand::On.resolve(false));
        assert!(!CompressorCommand::Off.resolve(true));
    }

    #[test]
    fn nan_reading_holds() {
        assert_eq!(decide(f32::NAN, 4.5, 3.5), CompressorCommand::Hold);
    }

    #[test]
    fn config_uses_its_thresholds() {
        let config = CompressorConfig {
            start: 8.0,
            stop: 2.0,
        };
        assert_eq!(config.decide(9.0), CompressorCommand::On);
        assert_eq!(config.decide(5.0), CompressorCommand::Hold);
        assert_eq!(config.decide(1.0), CompressorCommand::Off);
    }
}
