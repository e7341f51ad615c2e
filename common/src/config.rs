use serde::{Deserialize, Serialize};

use crate::types::CompressorConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub bind_host: String,
    pub http_port: u16,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            http_port: 5050,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_host: lookup("COORDINATOR_HOST")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.bind_host),
            http_port: lookup("COORDINATOR_HTTP_PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(defaults.http_port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub coordinator_url: String,
    pub snapshot_path: String,
    pub tick_ms: u64,
    pub mode_check_interval_ms: u64,
    pub upload_interval_ms: u64,
    pub save_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub upload_timeout_ms: u64,
    /// Simulated probe drops every Nth read; `None` never drops.
    pub sim_dropout_every: Option<u64>,
    /// Seed thresholds when no snapshot survives a restart.
    pub default_compressor: CompressorConfig,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://127.0.0.1:5050".to_string(),
            snapshot_path: "system_state.json".to_string(),
            tick_ms: 2_000,
            mode_check_interval_ms: 4_000,
            upload_interval_ms: 60_000,
            save_interval_ms: 120_000,
            request_timeout_ms: 3_000,
            upload_timeout_ms: 5_000,
            sim_dropout_every: None,
            default_compressor: CompressorConfig::default(),
        }
    }
}

impl EdgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ms = |key: &str, default: u64| {
            lookup(key)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let defaults = Self::default();
        let mut config = Self {
            coordinator_url: lookup("COORDINATOR_URL")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.coordinator_url),
            snapshot_path: lookup("EDGE_SNAPSHOT_PATH")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.snapshot_path),
            tick_ms: ms("EDGE_TICK_MS", defaults.tick_ms),
            mode_check_interval_ms: ms("EDGE_MODE_CHECK_MS", defaults.mode_check_interval_ms),
            upload_interval_ms: ms("EDGE_UPLOAD_MS", defaults.upload_interval_ms),
            save_interval_ms: ms("EDGE_SAVE_MS", defaults.save_interval_ms),
            request_timeout_ms: ms("EDGE_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            upload_timeout_ms: ms("EDGE_UPLOAD_TIMEOUT_MS", defaults.upload_timeout_ms),
            sim_dropout_every: lookup("EDGE_SIM_DROPOUT_EVERY")
                .and_then(|value| value.parse::<u64>().ok()),
            default_compressor: defaults.default_compressor,
        };
        config.sanitize();
        config
    }

    pub fn sanitize(&mut self) {
        self.coordinator_url = self.coordinator_url.trim_end_matches('/').to_string();
        self.tick_ms = self.tick_ms.max(100);
        self.mode_check_interval_ms = self.mode_check_interval_ms.max(self.tick_ms);
        self.upload_interval_ms = self.upload_interval_ms.max(self.tick_ms);
        self.save_interval_ms = self.save_interval_ms.max(self.tick_ms);
        self.request_timeout_ms = self.request_timeout_ms.clamp(3_000, 5_000);
        self.upload_timeout_ms = self.upload_timeout_ms.clamp(3_000, 5_000);
        self.sim_dropout_every = self.sim_dropout_every.filter(|every| *every > 0);

        if self.default_compressor.validate().is_err() {
            self.default_compressor = CompressorConfig::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn edge_defaults_without_environment() {
        assert_eq!(EdgeConfig::from_lookup(lookup(&[])), EdgeConfig::default());
    }

    #[test]
    fn edge_overrides_and_sanitizes() {
        let config = EdgeConfig::from_lookup(lookup(&[
            ("COORDINATOR_URL", "http://10.0.0.5:5050/"),
            ("EDGE_TICK_MS", "10"),
            ("EDGE_MODE_CHECK_MS", "50"),
            ("EDGE_REQUEST_TIMEOUT_MS", "60000"),
            ("EDGE_SAVE_MS", "not-a-number"),
        ]));

        assert_eq!(config.coordinator_url, "http://10.0.0.5:5050");
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.mode_check_interval_ms, 100);
        assert_eq!(config.request_timeout_ms, 5_000);
        assert_eq!(config.save_interval_ms, 120_000);
    }

    #[test]
    fn upload_timeout_and_dropout_come_from_environment() {
        let config = EdgeConfig::from_lookup(lookup(&[
            ("EDGE_UPLOAD_TIMEOUT_MS", "4000"),
            ("EDGE_SIM_DROPOUT_EVERY", "7"),
        ]));
        assert_eq!(config.upload_timeout_ms, 4_000);
        assert_eq!(config.sim_dropout_every, Some(7));

        let config = EdgeConfig::from_lookup(lookup(&[
            ("EDGE_UPLOAD_TIMEOUT_MS", "100"),
            ("EDGE_SIM_DROPOUT_EVERY", "0"),
        ]));
        assert_eq!(config.upload_timeout_ms, 3_000);
        assert_eq!(config.sim_dropout_every, None);

        let config = EdgeConfig::from_lookup(lookup(&[("EDGE_SIM_DROPOUT_EVERY", "often")]));
        assert_eq!(config.sim_dropout_every, None);
    }

    #[test]
    fn invalid_default_thresholds_fall_back() {
        let mut config = EdgeConfig {
            default_compressor: CompressorConfig {
                start: 1.0,
                stop: 9.0,
            },
            ..EdgeConfig::default()
        };
        config.sanitize();
        assert_eq!(config.default_compressor, CompressorConfig::default());
    }

    #[test]
    fn coordinator_port_override() {
        let config = CoordinatorConfig::from_lookup(lookup(&[("COORDINATOR_HTTP_PORT", "8088")]));
        assert_eq!(config.http_port, 8088);
        assert_eq!(config.bind_host, "0.0.0.0");
    }
}
