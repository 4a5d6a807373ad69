//! Hardware abstraction
//!
//! The IMU fusion engine, the strain-gauge amplifiers and the servo outputs are
//! black boxes exposing blocking read/write primitives. Loops never call them
//! directly on the async runtime: every access goes through [`run_blocking`],
//! which moves the call to a blocking thread and bounds it with a timeout.
//! Periodic loops use [`run_exclusive`] so a device stuck in an earlier call
//! costs one blocking thread, not one per iteration.

pub mod actuators;
pub mod attitude;
pub mod load_cell;
pub mod sim;

use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use actuators::{ActuatorBank, ServoCalibration, ServoPosition};
pub use attitude::{AttitudeSample, AttitudeSource};
pub use load_cell::{LoadCellArray, TareReport, ThrustSample};

use crate::error::HardwareError;
use crate::state::try_lock;

/// Fusion engine output [rad]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionAngles {
    /// Pitch axis
    pub phi: f64,
    /// Roll axis
    pub theta: f64,
}

/// Orientation sensor with an on-board or library fusion engine
pub trait ImuDriver: Send {
    /// Bring up the sensor and the fusion engine
    fn init(&mut self) -> Result<(), HardwareError>;

    /// Native poll interval of the fusion engine
    fn poll_interval(&self) -> Duration;

    /// Latest fused orientation, or `None` when no new data is ready
    fn read(&mut self) -> Result<Option<FusionAngles>, HardwareError>;
}

/// Strain-gauge amplifier delivering raw ADC counts
pub trait StrainGauge: Send {
    fn read_raw(&mut self) -> Result<i32, HardwareError>;
}

/// Angular servo output
pub trait Servo: Send {
    /// Move to `degrees` (already clamped by the caller)
    fn set_angle(&mut self, degrees: f64) -> Result<(), HardwareError>;
}

/// Run a blocking hardware call on the blocking pool, bounded by `timeout`
///
/// # Arguments
/// * `device` - Name used in the error on timeout or worker failure
/// * `timeout` - Upper bound on the call
/// * `f` - The blocking call
///
/// A call that times out keeps running on its thread; its result is dropped.
pub async fn run_blocking<T, F>(
    device: &'static str,
    timeout: Duration,
    f: F,
) -> Result<T, HardwareError>
where
    F: FnOnce() -> Result<T, HardwareError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(HardwareError::Worker { device }),
        Err(_) => Err(HardwareError::Timeout { device, timeout }),
    }
}

/// Like [`run_blocking`], for a device behind a shared mutex, without waiting
/// for the mutex
///
/// # Returns
/// * `Err(HardwareError::Busy)` straight away when another caller (a weigh, a
///   tare, or a call that already timed out) still holds the device
pub async fn run_exclusive<D, T, F>(
    device: &'static str,
    timeout: Duration,
    shared: &Arc<Mutex<D>>,
    f: F,
) -> Result<T, HardwareError>
where
    D: Send + 'static,
    F: FnOnce(&mut D) -> Result<T, HardwareError> + Send + 'static,
    T: Send + 'static,
{
    let shared = Arc::clone(shared);
    run_blocking(device, timeout, move || match try_lock(&shared) {
        Some(mut guard) => f(&mut guard),
        None => Err(HardwareError::Busy { device }),
    })
    .await
}


#[cfg(test)]
mod tests {
    use super::testing::HangingImu;
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stuck_device_is_busy_after_timeout() {
        let (imu, release) = HangingImu::new();
        let source = Arc::new(Mutex::new(AttitudeSource::new(Box::new(imu)).unwrap()));
        let timeout = Duration::from_millis(50);

        let first = run_exclusive("imu", timeout, &source, |s| s.read(0.0)).await;
        assert!(matches!(first, Err(HardwareError::Timeout { device: "imu", .. })));

        // The timed-out call still holds the device: later calls bail out
        // instead of queueing another thread behind it
        let started = std::time::Instant::now();
        for _ in 0..5 {
            let next = run_exclusive("imu", timeout, &source, |s| s.read(0.0)).await;
            assert!(matches!(next, Err(HardwareError::Busy { device: "imu" })));
        }
        assert!(started.elapsed() < timeout * 5);

        drop(release);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let recovered = run_exclusive("imu", timeout, &source, |s| s.read(0.0)).await;
        assert!(matches!(recovered, Ok(None)));
    }

    #[tokio::test]
    async fn test_run_exclusive_passes_result_through() {
        let shared = Arc::new(Mutex::new(41));
        let value = run_exclusive("counter", Duration::from_secs(1), &shared, |n| {
            *n += 1;
            Ok(*n)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
    }
}
