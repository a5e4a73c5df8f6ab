//! Checkpoint store
//!
//! Persists the [`TimeWindow`] between runs as `{"start": .., "end": ..}`.
//! Saves go through a temporary file in the same directory followed by a
//! rename, so readers only ever see a complete checkpoint.
//!
//! Two runs sharing a checkpoint file at the same time are not coordinated.

use chrono::{DateTime, Local};
use ferry_core::domain::window::TimeWindow;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How [`CheckpointStore::load`] came up with its window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Read back from the checkpoint file
    Restored,
    /// No checkpoint yet; the default window was written
    Created,
    /// The checkpoint could not be used; the default window replaced it
    Recovered { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedWindow {
    pub window: TimeWindow,
    pub outcome: LoadOutcome,
}

/// File-backed checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted window
    ///
    /// A missing checkpoint yields today's window (local midnight → now),
    /// which is persisted right away. A corrupt one is moved aside to
    /// `<name>.corrupt`, reported, and replaced the same way.
    pub fn load(&self) -> Result<LoadedWindow, CheckpointError> {
        self.load_at(Local::now())
    }

    /// [`load`](Self::load) with an explicit clock
    pub fn load_at(&self, now: DateTime<Local>) -> Result<LoadedWindow, CheckpointError> {
        let outcome = match fs::read(&self.path) {
            Ok(bytes) => match decode(&bytes) {
                Ok(window) => {
                    debug!(
                        path = %self.path.display(),
                        start = window.start,
                        end = window.end,
                        "Checkpoint restored"
                    );
                    return Ok(LoadedWindow {
                        window,
                        outcome: LoadOutcome::Restored,
                    });
                }
                Err(reason) => {
                    error!(path = %self.path.display(), %reason, "Checkpoint is corrupt, starting from today");
                    self.set_aside();
                    LoadOutcome::Recovered { reason }
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No checkpoint found, starting from today");
                LoadOutcome::Created
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Checkpoint is unreadable, starting from today");
                LoadOutcome::Recovered {
                    reason: e.to_string(),
                }
            }
        };

        let window = TimeWindow::starting_today(now);
        self.save(&window)?;

        Ok(LoadedWindow { window, outcome })
    }

    /// Persists `window` atomically
    pub fn save(&self, window: &TimeWindow) -> Result<(), CheckpointError> {
        let body = serde_json::to_vec(window)?;

        self.write_atomic(&body)
            .map_err(|source| CheckpointError::Write {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            path = %self.path.display(),
            start = window.start,
            end = window.end,
            "Checkpoint saved"
        );
        Ok(())
    }

    fn write_atomic(&self, body: &[u8]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }

    /// Keeps a corrupt checkpoint around for inspection
    fn set_aside(&self) {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("checkpoint"));
        name.push(".corrupt");
        let target = self.path.with_file_name(name);

        if let Err(e) = fs::rename(&self.path, &target) {
            warn!(path = %self.path.display(), error = %e, "Failed to set corrupt checkpoint aside");
        } else {
            warn!(path = %target.display(), "Corrupt checkpoint moved aside");
        }
    }
}

fn decode(bytes: &[u8]) -> Result<TimeWindow, String> {
    let window: TimeWindow = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;

    if !window.is_valid() {
        return Err(format!(
            "start {} is after end {}",
            window.start, window.end
        ));
    }

    Ok(window)
}
