//! Local diagnostic log of what telemetry attempted to report.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};

use crate::error::DeckhandError;

/// Append-only, one line per message:
/// `[pid][timestamp] Telemetry: <message>`.
#[derive(Debug)]
pub struct EventLogSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl EventLogSink {
    pub fn open(path: &Path) -> Result<Self, DeckhandError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| DeckhandError::TelemetryLogFile {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Writing to a closed sink does nothing.
    pub fn write_line(&self, message: &str) -> std::io::Result<()> {
        let line = format_line(std::process::id(), Local::now(), message);
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(file) => file.write_all(line.as_bytes()),
            None => Ok(()),
        }
    }

    /// Close the file. Safe to call more than once.
    pub fn close(&self) {
        let file = self
            .file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(file) = file {
            let _ = file.sync_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

fn format_line(pid: u32, timestamp: DateTime<Local>, message: &str) -> String {
    format!(
        "[{}][{}] Telemetry: {}\n",
        pid,
        timestamp.format("%Y-%m-%d %H:%M:%S%.f %z"),
        message
    )
}
