//! Error types for the rig controller
//!
//! Each subsystem has its own error enum so that faults stay contained to the
//! loop or command task that produced them. Startup code wraps these in
//! `anyhow` with context.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Sensor and actuator faults
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("{device} initialisation failed: {reason}")]
    Init { device: &'static str, reason: String },

    #[error("{device} read failed: {reason}")]
    Read { device: &'static str, reason: String },

    #[error("{device} write failed: {reason}")]
    Write { device: &'static str, reason: String },

    #[error("{device} did not respond within {timeout:?}")]
    Timeout {
        device: &'static str,
        timeout: Duration,
    },

    #[error("{device} worker thread aborted")]
    Worker { device: &'static str },

    #[error("{device} is still held by an earlier call")]
    Busy { device: &'static str },
}

/// Calibration table load and lookup failures
#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot open calibration table {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed calibration row at line {line}: {source}")]
    Row {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("calibration key at line {line} is not a whole degree (phi={phi}, theta={theta})")]
    NonIntegralKey { line: u64, phi: f64, theta: f64 },

    #[error("duplicate calibration key (phi={phi}, theta={theta})")]
    DuplicateKey { phi: i32, theta: i32 },

    #[error("calibration table has no rows")]
    Empty,

    #[error("no calibration entry for (phi={phi}, theta={theta})")]
    Miss { phi: i32, theta: i32 },

    #[error("no calibration key for non-finite attitude (pitch={pitch}, roll={roll})")]
    NonFinite { pitch: f64, roll: f64 },
}

/// Inbound messages that cannot be turned into a command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command topic '{0}'")]
    UnknownTopic(String),

    #[error("malformed payload on '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },
}

/// Session recording persistence failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot write session file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialise session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("session writer thread aborted")]
    Worker,
}

/// Transport failures on the telemetry side
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish on '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
}
