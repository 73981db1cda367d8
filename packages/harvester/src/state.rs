//! Persisted run state: the cutoff of the last successful harvest.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::RUN_STATE_FILE;
use crate::error::Result;
use crate::output::write_atomic;

/// Storage for the last successful cutoff of an output directory.
pub trait RunStateStore {
    /// Read the recorded cutoff. Missing or unreadable state is `None`.
    fn read_last_cutoff(&self) -> Option<NaiveDate>;

    /// Record `cutoff` as the resume point. Must be atomic.
    fn write_last_cutoff(&self, cutoff: NaiveDate) -> Result<()>;

    /// Human readable location, used in error messages.
    fn location(&self) -> String;
}

/// Run state kept as a single ISO date in `last_run_date.log`.
#[derive(Debug, Clone)]
pub struct FileRunStateStore {
    path: PathBuf,
}

impl FileRunStateStore {
    /// Store for the given output directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(RUN_STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunStateStore for FileRunStateStore {
    fn read_last_cutoff(&self) -> Option<NaiveDate> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Run state unreadable, ignoring");
                return None;
            }
        };

        let value = content.trim();
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                tracing::warn!(
                    path = %self.path.display(),
                    value,
                    "Run state corrupt, treating as no prior run"
                );
                None
            }
        }
    }

    fn write_last_cutoff(&self, cutoff: NaiveDate) -> Result<()> {
        write_atomic(&self.path, cutoff.format("%Y-%m-%d").to_string().as_bytes())?;
        tracing::debug!(path = %self.path.display(), %cutoff, "Run state written");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory run state, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRunStateStore {
    value: Cell<Option<NaiveDate>>,
}

impl InMemoryRunStateStore {
    pub fn new(value: Option<NaiveDate>) -> Self {
        Self {
            value: Cell::new(value),
        }
    }
}

impl RunStateStore for InMemoryRunStateStore {
    fn read_last_cutoff(&self) -> Option<NaiveDate> {
        self.value.get()
    }

    fn write_last_cutoff(&self, cutoff: NaiveDate) -> Result<()> {
        self.value.set(Some(cutoff));
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
