//! Attitude source
//!
//! Wraps the IMU fusion engine and turns its output into pitch/roll samples in
//! degrees.

use std::time::Duration;

use tracing::info;

use super::{FusionAngles, ImuDriver};
use crate::error::HardwareError;

/// One orientation sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeSample {
    /// [deg]
    pub pitch: f64,
    /// [deg]
    pub roll: f64,
    /// Seconds since the session started
    pub timestamp: f64,
}

impl AttitudeSample {
    pub fn from_fusion(fusion: FusionAngles, timestamp: f64) -> Self {
        Self {
            pitch: fusion.phi.to_degrees(),
            roll: fusion.theta.to_degrees(),
            timestamp,
        }
    }
}

/// Initialised IMU
pub struct AttitudeSource {
    imu: Box<dyn ImuDriver>,
    poll_interval: Duration,
}

impl AttitudeSource {
    /// Initialise the IMU. Failure here is fatal for the process.
    pub fn new(mut imu: Box<dyn ImuDriver>) -> Result<Self, HardwareError> {
        imu.init()?;
        let poll_interval = imu.poll_interval();
        info!("IMU initialised, poll interval {:?}", poll_interval);
        Ok(Self { imu, poll_interval })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Read one sample stamped with `timestamp`
    ///
    /// # Returns
    /// * `Ok(Some(sample))` when the fusion engine produced new data
    /// * `Ok(None)` when nothing new is available yet
    /// * `Err(HardwareError::Read)` when the fusion output is not finite
    pub fn read(&mut self, timestamp: f64) -> Result<Option<AttitudeSample>, HardwareError> {
        let Some(fusion) = self.imu.read()? else {
            return Ok(None);
        };
        if !fusion.phi.is_finite() || !fusion.theta.is_finite() {
            return Err(HardwareError::Read {
                device: "imu",
                reason: format!(
                    "non-finite fusion output (phi={}, theta={})",
                    fusion.phi, fusion.theta
                ),
            });
        }
        Ok(Some(AttitudeSample::from_fusion(fusion, timestamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::testing::FakeImu;

    #[test]
    fn test_fusion_is_converted_to_degrees() {
        let mut source = AttitudeSource::new(Box::new(FakeImu::level_at(5.0, -3.0))).unwrap();
        let sample = source.read(1.25).unwrap().unwrap();
        assert!((sample.pitch - 5.0).abs() < 1e-9);
        assert!((sample.roll + 3.0).abs() < 1e-9);
        assert_eq!(sample.timestamp, 1.25);
    }

    #[test]
    fn test_non_finite_fusion_is_a_read_fault() {
        let mut source =
            AttitudeSource::new(Box::new(FakeImu::level_at(f64::NAN, 0.0))).unwrap();
        assert!(matches!(
            source.read(0.0),
            Err(HardwareError::Read { device: "imu", .. })
        ));

        let mut source =
            AttitudeSource::new(Box::new(FakeImu::level_at(0.0, f64::INFINITY))).unwrap();
        assert!(source.read(0.0).is_err());
    }

    #[test]
    fn test_init_failure_is_reported() {
        let imu = FakeImu {
            fail_init: true,
            ..FakeImu::level_at(0.0, 0.0)
        };
        assert!(matches!(
            AttitudeSource::new(Box::new(imu)),
            Err(HardwareError::Init { .. })
        ));
    }
}
