//! Cross-process telemetry publication
//!
//! The producer periodically writes a versioned JSON record to a well-known
//! path by writing a temporary file in the same directory and renaming it
//! over the target, so readers see either the previous record or the new
//! one. Each record carries the producer PID and a heartbeat; readers treat
//! a missing file as "producer not running" and an old heartbeat as stale.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{TelemetryRecord, TelemetrySnapshot};
use crate::channels::WorkMode;
use crate::error::{CrsfLinkError, Result};

/// Layout version of [`PublishedRecord`]; bump on any incompatible change
pub const TELEMETRY_FORMAT_VERSION: u32 = 1;

/// Poll period used while waiting for a producer
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Record stored at the shared location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRecord {
    pub format_version: u32,
    pub producer_pid: u32,
    /// Unix time (ms) the record was written
    pub heartbeat_ms: i64,
    pub work_mode: WorkMode,
    pub telemetry: TelemetrySnapshot,
}

impl PublishedRecord {
    pub fn into_record(self) -> TelemetryRecord {
        TelemetryRecord {
            telemetry: self.telemetry,
            work_mode: self.work_mode,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionHeader {
    format_version: u32,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Writes telemetry records for other processes
#[derive(Debug, Clone)]
pub struct TelemetryPublisher {
    path: PathBuf,
    pid: u32,
}

impl TelemetryPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pid: std::process::id(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the shared record
    ///
    /// # Errors
    ///
    /// Returns error if the temporary file cannot be written or renamed
    pub fn publish(&self, telemetry: &TelemetrySnapshot, work_mode: WorkMode) -> Result<()> {
        let record = PublishedRecord {
            format_version: TELEMETRY_FORMAT_VERSION,
            producer_pid: self.pid,
            heartbeat_ms: now_ms(),
            work_mode,
            telemetry: telemetry.clone(),
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, &record)?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove the shared record, signalling that the producer stopped
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed telemetry file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads records published by another process
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    path: PathBuf,
    stale_after: Duration,
}

impl TelemetryReader {
    /// Attach to a running producer
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the shared file does not exist
    pub fn open(path: impl Into<PathBuf>, stale_after: Duration) -> Result<Self> {
        let reader = Self {
            path: path.into(),
            stale_after,
        };
        if !reader.path.exists() {
            return Err(reader.unavailable());
        }
        Ok(reader)
    }

    /// Poll until a fresh record is readable or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns the last read error once the timeout elapses
    pub async fn wait_ready(
        path: impl Into<PathBuf>,
        stale_after: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let reader = Self {
            path: path.into(),
            stale_after,
        };
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match reader.read() {
                Ok(_) => return Ok(reader),
                Err(e) if tokio::time::Instant::now() >= deadline => return Err(e),
                Err(e) => debug!("Waiting for telemetry producer: {}", e),
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    fn unavailable(&self) -> CrsfLinkError {
        CrsfLinkError::Unavailable {
            path: self.path.display().to_string(),
        }
    }

    /// Read and validate the current record
    ///
    /// # Errors
    ///
    /// - `Unavailable` if the file is missing
    /// - `IncompatibleFormat` if it was written with another layout version
    /// - `StalePublication` if its heartbeat is too old
    pub fn read(&self) -> Result<PublishedRecord> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(self.unavailable()),
            Err(e) => return Err(e.into()),
        };

        let header: VersionHeader = serde_json::from_slice(&contents)?;
        if header.format_version != TELEMETRY_FORMAT_VERSION {
            return Err(CrsfLinkError::IncompatibleFormat {
                found: header.format_version,
                expected: TELEMETRY_FORMAT_VERSION,
            });
        }

        let record: PublishedRecord = serde_json::from_slice(&contents)?;
        let age_ms = now_ms() - record.heartbeat_ms;
        if age_ms > self.stale_after.as_millis() as i64 {
            return Err(CrsfLinkError::StalePublication { age_ms });
        }

        Ok(record)
    }

    /// Read the current telemetry and work mode
    pub fn read_telemetry(&self) -> Result<TelemetryRecord> {
        self.read().map(PublishedRecord::into_record)
    }
}
