//! Acquisition loops and command tasks
//!
//! Each run of the rig spawns three loops (attitude, load cells, stopwatch)
//! that share one [`StopSignal`]. Slow commands (`weigh`, `tare`,
//! `savetofile`) run as their own short-lived tasks.

pub mod attitude;
pub mod commands;
pub mod loadcell;
pub mod stopwatch;

use std::fmt::Display;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::{StatusEvent, Telemetry};
use crate::config::params::FAULT_REPORT_INTERVAL;
use crate::coordinator::RigContext;
use crate::session::{SessionClock, SessionId};

/// Stop flag of one run, observed by its loops
///
/// A dropped sender counts as stopped.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolve once the run is stopped
    pub async fn stopped(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration` unless stopped first
    ///
    /// # Returns
    /// `false` if the run was stopped
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = self.stopped() => {}
            _ = tokio::time::sleep(duration) => {}
        }
        !self.is_stopped()
    }
}

/// Everything a loop of one run needs
#[derive(Clone)]
pub struct RunContext {
    pub rig: RigContext,
    pub session: SessionId,
    pub clock: SessionClock,
    pub stop: StopSignal,
}

/// Rate-limited fault reporting for one fault source
///
/// The first fault of a streak and every `FAULT_REPORT_INTERVAL`th after it
/// go to the `status` topic; the rest are only logged at debug level.
#[derive(Debug)]
pub struct FaultCounter {
    kind: &'static str,
    count: u64,
}

impl FaultCounter {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, count: 0 }
    }

    pub fn record(&mut self, telemetry: &Telemetry, detail: impl Display) {
        self.count += 1;
        if self.count == 1 || self.count % FAULT_REPORT_INTERVAL == 0 {
            warn!("{} fault #{}: {}", self.kind, self.count, detail);
            telemetry.status(&StatusEvent::Fault {
                kind: self.kind.to_string(),
                detail: detail.to_string(),
                count: self.count,
            });
        } else {
            debug!("{} fault #{}: {}", self.kind, self.count, detail);
        }
    }

    /// End the current streak
    pub fn clear(&mut self) {
        if self.count > 0 {
            info!("{} recovered after {} faults", self.kind, self.count);
            self.count = 0;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
