use thiserror::Error;

/// Rejected coordinator writes. The display text is returned to HTTP callers verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid mode '{0}', expected 'auto' or 'manual'")]
    InvalidMode(String),
    #[error("Invalid config values: temp_start_compressor and temp_stop_compressor must be numbers")]
    NonNumericConfig,
    #[error("Invalid config values: require 0 <= stop < start <= 50 (start={start}, stop={stop})")]
    ConfigOutOfRange { start: f64, stop: f64 },
}
