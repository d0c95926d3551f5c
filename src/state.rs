//! # Process State Module
//!
//! State that must survive a reboot or a low-power suspension.
//!
//! Loaded once at start and checkpointed by the sync loop right before each
//! sleep, so a power cut between cycles loses nothing but the cycle in
//! flight. Stored as JSON next to (not inside) the record store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sensor::climb::ClimbTracker;

/// Everything the controller carries from one cycle to the next
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    /// Cumulative climb and its baseline
    #[serde(default)]
    pub climb: ClimbTracker,
    /// Number of completed sync cycles
    #[serde(default)]
    pub cycles: u64,
}

/// File holding the persisted [`ProcessState`]
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state.
    ///
    /// A missing or unreadable file yields a fresh state; this is logged
    /// rather than treated as an error so a corrupted file cannot keep the
    /// device from starting.
    pub fn load(&self) -> ProcessState {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<ProcessState>(&bytes) {
                Ok(state) => {
                    info!(
                        "Restored state from {} ({} cycles, {:.1} m climbed)",
                        self.path.display(),
                        state.cycles,
                        state.climb.climbed()
                    );
                    state
                }
                Err(e) => {
                    warn!("Ignoring corrupt state file {}: {}", self.path.display(), e);
                    ProcessState::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No state file at {}, starting fresh", self.path.display());
                ProcessState::default()
            }
            Err(e) => {
                warn!("Cannot read state file {}: {}", self.path.display(), e);
                ProcessState::default()
            }
        }
    }

    /// Write `state` to disk, replacing the previous checkpoint atomically.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the temporary file cannot be written or renamed.
    pub fn checkpoint(&self, state: &ProcessState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");

        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Checkpointed state to {}", self.path.display());
        Ok(())
    }
}
