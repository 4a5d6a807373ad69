//! Session recording
//!
//! One append-only buffer shared by the attitude and load cell loops. Each
//! `start` opens a new session and discards the previous rows; appends carry
//! the session id they were started under, so a loop from a previous run that
//! is still finishing its last iteration cannot leak rows into the new one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SessionError;
use crate::hardware::{AttitudeSample, ThrustSample};
use crate::state::lock;

/// One recorded row, serialised without a tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionRow {
    Thrust {
        time: f64,
        thrust: f64,
        motor1: f64,
        motor2: f64,
        motor3: f64,
        motor4: f64,
    },
    Attitude {
        time: f64,
        roll: f64,
        pitch: f64,
    },
}

impl SessionRow {
    pub fn attitude(sample: &AttitudeSample) -> Self {
        SessionRow::Attitude {
            time: sample.timestamp,
            roll: sample.roll,
            pitch: sample.pitch,
        }
    }

    /// Thrust row with the same rounding as the telemetry
    pub fn thrust(sample: &ThrustSample) -> Self {
        let [motor1, motor2, motor3, motor4] = sample.rounded_motors();
        SessionRow::Thrust {
            time: sample.timestamp,
            thrust: sample.rounded_total(),
            motor1,
            motor2,
            motor3,
            motor4,
        }
    }
}

/// Identifier of one recording session
pub type SessionId = u64;

/// Elapsed-time base of one session
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Seconds since the session started
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Format elapsed seconds as `HH:MM:SS:CC`
pub fn format_stopwatch(elapsed_secs: f64) -> String {
    let elapsed = elapsed_secs.max(0.0);
    let total_secs = elapsed as u64;
    let centis = ((elapsed.fract() * 100.0) as u64).min(99);
    format!(
        "{:02}:{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        centis
    )
}

#[derive(Debug, Default)]
struct SessionBuffer {
    id: SessionId,
    rows: Vec<SessionRow>,
}

/// Shared session buffer
#[derive(Debug, Default)]
pub struct SessionRecorder {
    buffer: Mutex<SessionBuffer>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the current rows and open a new session
    pub fn start_session(&self) -> SessionId {
        let mut buffer = lock(&self.buffer);
        let dropped = buffer.rows.len();
        buffer.id += 1;
        buffer.rows.clear();
        if dropped > 0 {
            debug!("Discarded {} unsaved rows", dropped);
        }
        buffer.id
    }

    /// Append a row to session `id`
    ///
    /// # Returns
    /// `false` if `id` is no longer the current session (row dropped)
    pub fn append(&self, id: SessionId, row: SessionRow) -> bool {
        let mut buffer = lock(&self.buffer);
        if buffer.id != id {
            return false;
        }
        buffer.rows.push(row);
        true
    }

    /// Copy of the current rows
    pub fn snapshot(&self) -> Vec<SessionRow> {
        lock(&self.buffer).rows.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.buffer).rows.len()
    }

    /// Write the current rows as one JSON document into `dir`
    ///
    /// The file is named after the local time (`YYYY_MM_DD-HH_MM_SS.json`).
    /// The buffer is kept.
    ///
    /// # Returns
    /// The written file and the number of rows in it
    pub fn save(&self, dir: &Path) -> Result<(PathBuf, usize), SessionError> {
        let rows = self.snapshot();
        let json = serde_json::to_vec(&rows)?;

        let name = format!("{}.json", chrono::Local::now().format("%Y_%m_%d-%H_%M_%S"));
        let path = dir.join(name);
        fs::create_dir_all(dir)
            .and_then(|_| fs::write(&path, json))
            .map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;

        info!("Session saved: {} rows to {}", rows.len(), path.display());
        Ok((path, rows.len()))
    }
}
