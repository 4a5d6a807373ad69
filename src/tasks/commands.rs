//! Slow operator commands
//!
//! Each runs as its own task so the dispatch path never waits on hardware or
//! the filesystem. Failures are reported on the `status` topic.

use tracing::{info, warn};

use super::FaultCounter;
use crate::bus::StatusEvent;
use crate::coordinator::RigContext;
use crate::error::SessionError;
use crate::hardware::{run_blocking, TareReport};
use crate::state::lock;

/// Weigh the rig and publish the result on `weight`
///
/// Waits for the load cell loop to release the array.
pub async fn weigh(rig: RigContext) {
    let cells = rig.load_cells.clone();
    let timeout = rig.timing.calibration_timeout();
    match run_blocking("load cells", timeout, move || lock(&cells).weigh()).await {
        Ok(weight) => rig.telemetry.weight(weight),
        Err(e) => FaultCounter::new("weigh").record(&rig.telemetry, e),
    }
}

/// Zero all four load cells and report which ones failed
pub async fn tare(rig: RigContext) {
    let cells = rig.load_cells.clone();
    let timeout = rig.timing.calibration_timeout();
    let tared = run_blocking("load cells", timeout, move || -> Result<TareReport, _> {
        Ok(lock(&cells).tare())
    })
    .await;

    match tared {
        Ok(report) => {
            let failed: Vec<String> = report
                .failed_motors()
                .into_iter()
                .map(|motor| motor.name().to_string())
                .collect();
            if report.is_complete() {
                info!("Tare complete");
            } else {
                warn!("Tare incomplete, failed: {:?}", failed);
            }
            rig.telemetry.status(&StatusEvent::Tare { failed });
        }
        Err(e) => FaultCounter::new("tare").record(&rig.telemetry, e),
    }
}

/// Write the session buffer to the log directory
pub async fn save(rig: RigContext) {
    let recorder = rig.recorder.clone();
    let dir = rig.log_dir.clone();
    let saved = tokio::task::spawn_blocking(move || recorder.save(&dir))
        .await
        .unwrap_or(Err(SessionError::Worker));

    match saved {
        Ok((path, rows)) => rig.telemetry.status(&StatusEvent::Saved {
            file: path.display().to_string(),
            rows,
        }),
        Err(e) => FaultCounter::new("persistence").record(&rig.telemetry, e),
    }
}
