// Attitude control
// Table-driven actuation with an optional PID stage in front of the lookup

pub mod calibration_table;
pub mod pid_controller;
pub mod policy;

pub use calibration_table::{quantize, ActuatorAngles, CalibrationTable};
pub use pid_controller::PidController;
pub use policy::ControlPolicy;

/// Angles applied to the four actuator servos [deg]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    pub front: f64,
    pub back: f64,
    pub left: f64,
    pub right: f64,
}

impl ActuatorCommand {
    pub const CENTERED: Self = Self {
        front: 0.0,
        back: 0.0,
        left: 0.0,
        right: 0.0,
    };

    /// Build a command from a table row.
    ///
    /// The table stores the left servo's magnitude; the left servo is mounted
    /// mirrored, so its command is negated.
    pub fn from_table(angles: &ActuatorAngles) -> Self {
        Self {
            front: angles.front,
            back: angles.back,
            left: -angles.left,
            right: angles.right,
        }
    }

    /// Clamp every channel to `min..=max`
    pub fn clamped(&self, min: f64, max: f64) -> Self {
        Self {
            front: self.front.clamp(min, max),
            back: self.back.clamp(min, max),
            left: self.left.clamp(min, max),
            right: self.right.clamp(min, max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_left_sign_is_inverted() {
        let command = ActuatorCommand::from_table(&ActuatorAngles {
            front: 3.0,
            back: 4.0,
            left: 10.0,
            right: 5.0,
        });
        assert_eq!(command.left, -10.0);
        assert_eq!(command.front, 3.0);
        assert_eq!(command.back, 4.0);
        assert_eq!(command.right, 5.0);
    }

    #[test]
    fn test_clamped() {
        let command = ActuatorCommand {
            front: 120.0,
            back: -95.0,
            left: 45.0,
            right: -90.0,
        }
        .clamped(-90.0, 90.0);
        assert_eq!(
            command,
            ActuatorCommand {
                front: 90.0,
                back: -90.0,
                left: 45.0,
                right: -90.0
            }
        );
    }
}
