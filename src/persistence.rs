//! Persistence of the commanded target temperature.
//!
//! The last setpoint received over MQTT survives a restart; the configured
//! default is only used when nothing has been stored yet.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Somewhere the current target can be kept across restarts.
pub trait TargetStore: Send + Sync {
    /// The last saved target, if any.
    fn load(&self) -> Option<f64>;

    fn save(&self, target: f64) -> std::io::Result<()>;
}

impl<S: TargetStore + ?Sized> TargetStore for Arc<S> {
    fn load(&self) -> Option<f64> {
        (**self).load()
    }

    fn save(&self, target: f64) -> std::io::Result<()> {
        (**self).save(target)
    }
}

/// On-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTarget {
    pub target: f64,
    pub updated_at: DateTime<Utc>,
}

/// Target store backed by a small JSON file.
pub struct JsonTargetStore {
    path: PathBuf,
}

impl JsonTargetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TargetStore for JsonTargetStore {
    fn load(&self) -> Option<f64> {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedTarget>(&bytes) {
                Ok(state) if state.target.is_finite() => {
                    info!(
                        "Loaded persisted target {} (set {}) from {:?}",
                        state.target, state.updated_at, self.path
                    );
                    Some(state.target)
                }
                Ok(state) => {
                    warn!("Ignoring non-finite persisted target {}", state.target);
                    None
                }
                Err(e) => {
                    warn!("Failed to parse target file {:?}: {}", self.path, e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No persisted target found (first run)");
                None
            }
            Err(e) => {
                error!("Failed to read target file {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn save(&self, target: f64) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&PersistedTarget {
            target,
            updated_at: Utc::now(),
        })?;
        fs::write(&self.path, data)?;
        info!("Saved target {} to {:?}", target, self.path);
        Ok(())
    }
}
