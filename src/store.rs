//! Durable storage for [`RunState`].
//!
//! The store is the only component that serializes run state. Every save
//! writes the complete document to a temporary file in the target directory
//! and renames it over the state file, so a reader sees either the previous
//! or the next complete state.

use chrono::{DateTime, Local};
use conveyor_common::RunState;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::StoreError;

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically replace the state file with `state`.
    pub fn save(&self, state: &RunState) -> Result<(), StoreError> {
        let mut buf = serde_json::to_string_pretty(state).map_err(StoreError::Serialize)?;
        buf.push('\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| self.io_error(&dir, source))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".agent_state")
            .suffix(".json.tmp")
            .tempfile_in(&dir)
            .map_err(|source| self.io_error(&dir, source))?;
        tmp.write_all(buf.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|source| self.io_error(tmp.path(), source))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(&self.path, e.error))?;

        debug!(
            path = %self.path.display(),
            issues = state.issues.len(),
            phases_merged = state.phases_merged.len(),
            "run state saved"
        );
        Ok(())
    }

    /// Load the state file.
    pub fn load(&self) -> Result<RunState, StoreError> {
        Self::load_from(&self.path)
    }

    pub fn load_from(path: &Path) -> Result<RunState, StoreError> {
        let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let state = serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "run state loaded");
        Ok(state)
    }

    /// Modification time of the state file, if it exists.
    pub fn last_saved(&self) -> Option<DateTime<Local>> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(DateTime::<Local>::from(modified))
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
