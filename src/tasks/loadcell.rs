//! Load cell loop

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{FaultCounter, RunContext};
use crate::error::HardwareError;
use crate::hardware::run_exclusive;
use crate::session::SessionRow;

/// Samples between periodic debug logs
const LOG_EVERY: u32 = 20;

/// Sample all four cells once per period, publish and record the result
///
/// An iteration is skipped while `weigh` or `tare` holds the array. After a
/// timeout the array stays held by the stuck read, and every busy iteration
/// counts as a fault until a sample comes through.
pub async fn loadcell_loop(run: RunContext) {
    let RunContext {
        rig,
        session,
        clock,
        mut stop,
    } = run;

    let timeout = rig.timing.hardware_timeout();
    let mut faults = FaultCounter::new("loadcell");
    let mut log_counter = 0u32;
    let mut stalled = false;
    let mut ticker = interval(rig.timing.loadcell_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Load cell loop started (session {})", session);

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = ticker.tick() => {}
        }

        let timestamp = clock.elapsed_secs();
        let reading = run_exclusive("load cells", timeout, &rig.load_cells, move |array| {
            array.measure(timestamp)
        })
        .await;

        match reading {
            Ok(sample) => {
                stalled = false;
                faults.clear();
                rig.telemetry.thrust(&sample);
                rig.recorder.append(session, SessionRow::thrust(&sample));

                log_counter += 1;
                if log_counter >= LOG_EVERY {
                    log_counter = 0;
                    debug!(
                        "[Load cells] {:?} total={:.2} N",
                        sample.rounded_motors(),
                        sample.rounded_total()
                    );
                }
            }
            Err(HardwareError::Busy { .. }) if !stalled => {
                debug!("Load cells busy, sample skipped")
            }
            Err(e) => {
                if matches!(e, HardwareError::Timeout { .. }) {
                    stalled = true;
                }
                faults.record(&rig.telemetry, e);
            }
        }
    }

    info!("Load cell loop stopped (session {})", session);
}
