//! Actuator bank
//!
//! Four angular servos (front, back, left, right) sharing one travel range.

use std::fmt;

use tracing::{debug, warn};

use super::Servo;
use crate::config::{ServoBankConfig, ServoConfig};
use crate::control::ActuatorCommand;
use crate::error::HardwareError;

/// Servo mounting position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoPosition {
    Front,
    Back,
    Left,
    Right,
}

impl ServoPosition {
    pub const ALL: [ServoPosition; 4] = [
        ServoPosition::Front,
        ServoPosition::Back,
        ServoPosition::Left,
        ServoPosition::Right,
    ];
}

impl fmt::Display for ServoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServoPosition::Front => "front",
            ServoPosition::Back => "back",
            ServoPosition::Left => "left",
            ServoPosition::Right => "right",
        };
        f.write_str(name)
    }
}

/// Linear angle to pulse-width mapping of one servo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoCalibration {
    pub min_angle: f64,
    pub max_angle: f64,
    pub min_pulse_us: f64,
    pub max_pulse_us: f64,
}

impl ServoCalibration {
    pub fn new(bank: &ServoBankConfig, servo: &ServoConfig) -> Self {
        Self {
            min_angle: bank.min_angle,
            max_angle: bank.max_angle,
            min_pulse_us: servo.min_pulse_us,
            max_pulse_us: servo.max_pulse_us,
        }
    }

    /// Pulse width for `angle` [μs]; angles outside the travel are clamped
    pub fn pulse_width_us(&self, angle: f64) -> f64 {
        let angle = angle.clamp(self.min_angle, self.max_angle);
        let span = self.max_angle - self.min_angle;
        if span <= 0.0 {
            return self.min_pulse_us;
        }
        let fraction = (angle - self.min_angle) / span;
        self.min_pulse_us + fraction * (self.max_pulse_us - self.min_pulse_us)
    }
}

/// The four actuator servos
pub struct ActuatorBank {
    /// front, back, left, right
    servos: [Box<dyn Servo>; 4],
    min_angle: f64,
    max_angle: f64,
    last_command: Option<ActuatorCommand>,
}

impl ActuatorBank {
    /// Create the bank
    ///
    /// # Arguments
    /// * `servos` - Outputs in front, back, left, right order
    /// * `config` - Shared travel range
    pub fn new(servos: [Box<dyn Servo>; 4], config: &ServoBankConfig) -> Self {
        Self {
            servos,
            min_angle: config.min_angle,
            max_angle: config.max_angle,
            last_command: None,
        }
    }

    /// Clamp `command` to the travel range and write all four servos
    ///
    /// Every servo is written even if an earlier one fails; the first error
    /// is returned.
    ///
    /// # Returns
    /// The command as applied (after clamping)
    pub fn apply(&mut self, command: &ActuatorCommand) -> Result<ActuatorCommand, HardwareError> {
        let applied = command.clamped(self.min_angle, self.max_angle);
        let angles = [applied.front, applied.back, applied.left, applied.right];

        let mut first_error = None;
        for ((position, servo), angle) in ServoPosition::ALL
            .into_iter()
            .zip(self.servos.iter_mut())
            .zip(angles)
        {
            if let Err(e) = servo.set_angle(angle) {
                warn!("{} servo write failed: {}", position, e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        debug!(
            "Actuators: front={:.1} back={:.1} left={:.1} right={:.1}",
            applied.front, applied.back, applied.left, applied.right
        );
        self.last_command = Some(applied);
        Ok(applied)
    }

    /// Move every servo to 0°
    pub fn center(&mut self) -> Result<ActuatorCommand, HardwareError> {
        self.apply(&ActuatorCommand::CENTERED)
    }

    /// Last command written successfully to all four servos
    pub fn last_command(&self) -> Option<ActuatorCommand> {
        self.last_command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::testing::RecordingServo;

    struct BrokenServo;

    impl Servo for BrokenServo {
        fn set_angle(&mut self, _degrees: f64) -> Result<(), HardwareError> {
            Err(HardwareError::Write {
                device: "servo",
                reason: "pwm channel unavailable".into(),
            })
        }
    }

    fn bank() -> (ActuatorBank, [RecordingServo; 4]) {
        let recorders: [RecordingServo; 4] = Default::default();
        let servos = recorders
            .clone()
            .map(|servo| -> Box<dyn Servo> { Box::new(servo) });
        (
            ActuatorBank::new(servos, &ServoBankConfig::default()),
            recorders,
        )
    }

    #[test]
    fn test_apply_clamps_to_travel() {
        let (mut bank, recorders) = bank();
        let applied = bank
            .apply(&ActuatorCommand {
                front: 100.0,
                back: -2.0,
                left: -120.0,
                right: 45.0,
            })
            .unwrap();
        assert_eq!(applied.front, 90.0);
        assert_eq!(applied.left, -90.0);
        assert_eq!(recorders[0].last(), Some(90.0));
        assert_eq!(recorders[1].last(), Some(-2.0));
        assert_eq!(recorders[2].last(), Some(-90.0));
        assert_eq!(recorders[3].last(), Some(45.0));
        assert_eq!(bank.last_command(), Some(applied));
    }

    #[test]
    fn test_failed_write_keeps_last_command() {
        let front = RecordingServo::default();
        let servos: [Box<dyn Servo>; 4] = [
            Box::new(front.clone()),
            Box::new(BrokenServo),
            Box::new(RecordingServo::default()),
            Box::new(RecordingServo::default()),
        ];
        let mut bank = ActuatorBank::new(servos, &ServoBankConfig::default());
        assert!(bank.apply(&ActuatorCommand::CENTERED).is_err());
        assert_eq!(bank.last_command(), None);
        // the healthy servos were still driven
        assert_eq!(front.last(), Some(0.0));
    }

    #[test]
    fn test_pulse_width_mapping() {
        let config = ServoBankConfig::default();
        let calibration = ServoCalibration::new(&config, &config.front);
        assert_eq!(calibration.pulse_width_us(-90.0), 750.0);
        assert_eq!(calibration.pulse_width_us(90.0), 2200.0);
        assert_eq!(calibration.pulse_width_us(0.0), 1475.0);
        assert_eq!(calibration.pulse_width_us(135.0), 2200.0);

        let back = ServoCalibration::new(&config, &config.back);
        assert_eq!(back.pulse_width_us(-90.0), 770.0);
    }
}
