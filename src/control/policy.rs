//! Actuation policy
//!
//! AutoLevel keys the calibration table on the measured attitude. ManualAngle
//! runs one PID per axis (measured attitude in, slider setpoint as target)
//! and keys the table on the rounded PID outputs.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{quantize, ActuatorCommand, CalibrationTable, PidController};
use crate::config::PidConfig;
use crate::error::TableError;
use crate::hardware::AttitudeSample;
use crate::state::{ControlTargets, SubMode};

/// Result of one policy step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyOutput {
    /// (phi, theta) key used for the lookup
    pub key: (i32, i32),
    pub command: ActuatorCommand,
}

/// Per-run policy state, owned by the attitude loop
pub struct ControlPolicy {
    table: Arc<CalibrationTable>,
    pitch_pid: PidController,
    roll_pid: PidController,
    /// Last seen `ControlTargets::manual_entries`
    manual_entries: u64,
}

impl ControlPolicy {
    pub fn new(table: Arc<CalibrationTable>, pid: &PidConfig) -> Self {
        let axis = || {
            PidController::new(pid.kp, pid.ki, pid.kd, pid.integral_limit, pid.output_limit)
        };
        Self {
            table,
            pitch_pid: axis(),
            roll_pid: axis(),
            manual_entries: 0,
        }
    }

    /// Compute the actuator command for one attitude sample
    ///
    /// # Returns
    /// * `Ok(output)` with the table key and the command to apply
    /// * `Err(TableError::Miss)` when the key is not in the table, or
    ///   `Err(TableError::NonFinite)` for a NaN/infinite attitude; either way
    ///   the actuators must keep their last command
    pub fn step(
        &mut self,
        sample: &AttitudeSample,
        targets: &ControlTargets,
    ) -> Result<PolicyOutput, TableError> {
        // Rejected before the PID stage so it never enters the integral
        if !sample.pitch.is_finite() || !sample.roll.is_finite() {
            return Err(TableError::NonFinite {
                pitch: sample.pitch,
                roll: sample.roll,
            });
        }

        let key = match targets.sub_mode {
            SubMode::AutoLevel => quantize(sample.pitch, sample.roll)?,
            SubMode::ManualAngle => {
                if targets.manual_entries != self.manual_entries {
                    self.pitch_pid.reset();
                    self.roll_pid.reset();
                    self.manual_entries = targets.manual_entries;
                    debug!("PID state reset on entering ManualAngle");
                }
                let pitch =
                    self.pitch_pid
                        .update(targets.pitch_setpoint, sample.pitch, sample.timestamp);
                let roll = self
                    .roll_pid
                    .update(targets.roll_setpoint, sample.roll, sample.timestamp);
                trace!(
                    "PID pitch={:.3} (i={:.3}) roll={:.3} (i={:.3})",
                    self.pitch_pid.get_output(),
                    self.pitch_pid.get_integral(),
                    self.roll_pid.get_output(),
                    self.roll_pid.get_integral()
                );
                quantize(pitch, roll)?
            }
        };

        let angles = self.table.lookup(key.0, key.1)?;
        Ok(PolicyOutput {
            key,
            command: ActuatorCommand::from_table(&angles),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Arc<CalibrationTable> {
        let mut csv = String::from("phi,theta,front,back,left,right\n");
        for phi in -10..=10 {
            for theta in -10..=10 {
                csv.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    phi,
                    theta,
                    phi as f64 * 0.5,
                    -phi as f64 * 0.5,
                    theta as f64 * 0.25,
                    -theta as f64 * 0.25
                ));
            }
        }
        Arc::new(CalibrationTable::from_reader(csv.as_bytes()).unwrap())
    }

    fn sample(pitch: f64, roll: f64, timestamp: f64) -> AttitudeSample {
        AttitudeSample {
            pitch,
            roll,
            timestamp,
        }
    }

    fn gains(kp: f64, ki: f64) -> PidConfig {
        PidConfig {
            kp,
            ki,
            kd: 0.0,
            integral_limit: 15.0,
            output_limit: 25.0,
        }
    }

    #[test]
    fn test_autolevel_keys_on_rounded_measurement() {
        let csv = "phi,theta,front,back,left,right\n5,-3,2.0,-2.0,1.0,-1.0\n";
        let table = Arc::new(CalibrationTable::from_reader(csv.as_bytes()).unwrap());
        let mut policy = ControlPolicy::new(table, &PidConfig::default());

        let output = policy
            .step(&sample(5.0, -3.0, 0.0), &ControlTargets::default())
            .unwrap();
        assert_eq!(output.key, (5, -3));
        assert_eq!(
            output.command,
            ActuatorCommand {
                front: 2.0,
                back: -2.0,
                left: -1.0,
                right: -1.0
            }
        );
    }

    #[test]
    fn test_autolevel_ignores_setpoints() {
        let mut policy = ControlPolicy::new(table(), &gains(1.0, 0.0));
        let targets = ControlTargets {
            pitch_setpoint: 7.0,
            ..ControlTargets::default()
        };
        let output = policy.step(&sample(2.2, -1.8, 0.0), &targets).unwrap();
        assert_eq!(output.key, (2, -2));
    }

    #[test]
    fn test_manual_keys_on_rounded_pid_output() {
        let mut policy = ControlPolicy::new(table(), &gains(0.5, 0.0));
        let targets = ControlTargets {
            sub_mode: SubMode::ManualAngle,
            pitch_setpoint: 10.0,
            roll_setpoint: -4.0,
            manual_entries: 1,
            ..ControlTargets::default()
        };
        // errors: pitch 10 - 2 = 8, roll -4 - 0 = -4 -> outputs 4, -2
        let output = policy.step(&sample(2.0, 0.0, 0.0), &targets).unwrap();
        assert_eq!(output.key, (4, -2));
        assert_eq!(output.command.front, 2.0);
        assert_eq!(output.command.left, 0.5);
    }

    #[test]
    fn test_manual_entry_resets_pid() {
        let mut policy = ControlPolicy::new(table(), &gains(0.0, 1.0));
        let mut targets = ControlTargets {
            sub_mode: SubMode::ManualAngle,
            pitch_setpoint: 4.0,
            manual_entries: 1,
            ..ControlTargets::default()
        };
        policy.step(&sample(0.0, 0.0, 0.0), &targets).unwrap();
        let output = policy.step(&sample(0.0, 0.0, 1.0), &targets).unwrap();
        assert_eq!(output.key, (4, 0));

        // a fresh entry into ManualAngle starts from a clean integral
        targets.manual_entries = 2;
        let output = policy.step(&sample(0.0, 0.0, 2.0), &targets).unwrap();
        assert_eq!(output.key, (0, 0));
    }

    #[test]
    fn test_autolevel_rejects_non_finite_sample() {
        let mut policy = ControlPolicy::new(table(), &PidConfig::default());
        let err = policy
            .step(&sample(f64::NAN, 0.0, 0.0), &ControlTargets::default())
            .unwrap_err();
        assert!(matches!(err, TableError::NonFinite { .. }));
    }

    #[test]
    fn test_manual_recovers_after_non_finite_sample() {
        let targets = ControlTargets {
            sub_mode: SubMode::ManualAngle,
            pitch_setpoint: 4.0,
            roll_setpoint: -2.0,
            manual_entries: 1,
            ..ControlTargets::default()
        };
        let mut clean = ControlPolicy::new(table(), &gains(0.5, 0.5));
        let mut glitched = ControlPolicy::new(table(), &gains(0.5, 0.5));

        clean.step(&sample(0.0, 0.0, 0.0), &targets).unwrap();
        glitched.step(&sample(0.0, 0.0, 0.0), &targets).unwrap();
        assert!(glitched
            .step(&sample(f64::NAN, f64::NAN, 0.5), &targets)
            .is_err());

        for t in [1.0, 2.0, 3.0] {
            let expected = clean.step(&sample(1.0, -0.5, t), &targets).unwrap();
            let output = glitched.step(&sample(1.0, -0.5, t), &targets).unwrap();
            assert_eq!(output.key, expected.key);
            assert_eq!(output.command, expected.command);
        }
    }

    #[test]
    fn test_lookup_miss_is_reported() {
        let mut policy = ControlPolicy::new(table(), &PidConfig::default());
        let err = policy
            .step(&sample(15.0, 0.0, 0.0), &ControlTargets::default())
            .unwrap_err();
        assert!(matches!(err, TableError::Miss { phi: 15, theta: 0 }));
    }
}
