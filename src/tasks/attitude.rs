//! Attitude loop
//!
//! Polls the IMU at its native interval, publishes and records each sample,
//! then drives the actuators through the control policy.

use tracing::{debug, info, trace};

use super::{FaultCounter, RunContext};
use crate::control::ControlPolicy;
use crate::hardware::run_exclusive;
use crate::session::SessionRow;

/// Iterations between periodic debug logs
const LOG_EVERY: u32 = 250;

pub async fn attitude_loop(run: RunContext) {
    let RunContext {
        rig,
        session,
        clock,
        mut stop,
    } = run;

    let timeout = rig.timing.hardware_timeout();
    let mut policy = ControlPolicy::new(rig.table.clone(), &rig.pid);
    let mut imu_faults = FaultCounter::new("imu");
    let mut servo_faults = FaultCounter::new("actuator");
    let mut misses = FaultCounter::new("lookup");
    let mut log_counter = 0u32;

    info!("Attitude loop started (session {})", session);

    while !stop.is_stopped() {
        let timestamp = clock.elapsed_secs();
        let reading =
            run_exclusive("imu", timeout, &rig.attitude, move |source| source.read(timestamp))
                .await;

        match reading {
            Ok(Some(sample)) => {
                imu_faults.clear();
                rig.telemetry.attitude(&sample);
                rig.recorder.append(session, SessionRow::attitude(&sample));

                log_counter += 1;
                if log_counter >= LOG_EVERY {
                    log_counter = 0;
                    debug!(
                        "[Attitude] pitch={:.2} roll={:.2} t={:.2}",
                        sample.pitch, sample.roll, sample.timestamp
                    );
                }

                let targets = rig.targets.snapshot();
                match policy.step(&sample, &targets) {
                    Ok(output) => {
                        misses.clear();
                        trace!("Key {:?} -> {:?}", output.key, output.command);
                        let command = output.command;
                        let written = run_exclusive("servos", timeout, &rig.actuators, move |bank| {
                            bank.apply(&command)
                        })
                        .await;
                        match written {
                            Ok(_) => servo_faults.clear(),
                            Err(e) => servo_faults.record(&rig.telemetry, e),
                        }
                    }
                    // Actuators hold their last command
                    Err(e) => misses.record(&rig.telemetry, e),
                }
            }
            Ok(None) => {}
            Err(e) => imu_faults.record(&rig.telemetry, e),
        }

        if !stop.sleep(rig.imu_poll_interval).await {
            break;
        }
    }

    info!(
        "Attitude loop stopped (session {}, {} consecutive lookup misses)",
        session,
        misses.count()
    );
}
