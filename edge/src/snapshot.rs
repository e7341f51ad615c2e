use std::{io::ErrorKind, path::PathBuf};

use anyhow::Context;
use chiller_common::CompressorConfig;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// On-disk copy of the thresholds, used only to seed the controller after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    pub config: CompressorConfig,
    /// Epoch seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Overwrites the file in place; a crash mid-write can leave it truncated.
    pub async fn save(&self, config: &CompressorConfig) -> anyhow::Result<LocalSnapshot> {
        let snapshot = LocalSnapshot {
            config: *config,
            timestamp: Utc::now().timestamp(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(&self.path, payload)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        info!("state saved to {}", self.path.display());
        Ok(snapshot)
    }

    /// Missing, unreadable or invalid content all mean "no prior state".
    pub async fn load(&self) -> Option<CompressorConfig> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("no saved state found, starting fresh");
                return None;
            }
            Err(err) => {
                warn!("failed to read {}: {err}", self.path.display());
                return None;
            }
        };

        let snapshot = match serde_json::from_slice::<LocalSnapshot>(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("ignoring unreadable snapshot {}: {err}", self.path.display());
                return None;
            }
        };

        if let Err(err) = snapshot.config.validate() {
            warn!("ignoring snapshot with invalid thresholds: {err}");
            return None;
        }

        info!(
            "restored state saved at epoch {} from {}",
            snapshot.timestamp,
            self.path.display()
        );
        Some(snapshot.config)
    }
}
