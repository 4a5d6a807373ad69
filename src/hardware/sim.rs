//! Simulated rig
//!
//! Stand-ins for the IMU, the HX711 amplifiers and the servo outputs so the
//! controller can run end to end without the test stand attached.

use std::f64::consts::PI;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, trace};

use super::{FusionAngles, ImuDriver, Servo, ServoCalibration, ServoPosition, StrainGauge};
use crate::config::RigConfig;
use crate::error::HardwareError;

/// Simulated devices, ready to be wrapped by the rig components
pub struct SimRig {
    pub imu: Box<dyn ImuDriver>,
    /// motor1..motor4
    pub gauges: [Box<dyn StrainGauge>; 4],
    /// front, back, left, right
    pub servos: [Box<dyn Servo>; 4],
}

/// Build the simulated devices from the rig configuration
pub fn build(config: &RigConfig) -> SimRig {
    let sim = &config.sim;

    let imu = SimImu {
        started: None,
        poll_interval: Duration::from_millis(sim.imu_poll_interval_ms),
        amplitude_deg: sim.attitude_amplitude_deg,
        period_s: sim.attitude_period_s,
        settings_file: config.imu.settings_file.clone(),
        slerp_power: config.imu.slerp_power,
    };

    let gauges = config.load_cells.channels.map(|channel| -> Box<dyn StrainGauge> {
        Box::new(SimGauge {
            offset_counts: sim.cell_offset_counts,
            scale_ratio: channel.scale_ratio,
            load_kg: sim.cell_load_kg,
            sample_delay: Duration::from_micros(sim.sample_delay_us),
            samples: 0,
        })
    });

    info!(
        "Simulated HX711 array (SCK GPIO{}, DOUT {:?})",
        config.load_cells.sck_pin,
        config.load_cells.channels.map(|channel| channel.dout_pin)
    );

    let bank = &config.servos;
    let servo_configs = [bank.front, bank.back, bank.left, bank.right];
    let mut positions = ServoPosition::ALL.into_iter();
    let servos = servo_configs.map(|servo| -> Box<dyn Servo> {
        Box::new(SimServo {
            position: positions.next().unwrap_or(ServoPosition::Front),
            pin: servo.pin,
            calibration: ServoCalibration::new(bank, &servo),
            pulse_us: None,
        })
    });

    SimRig {
        imu: Box::new(imu),
        gauges,
        servos,
    }
}

/// Attitude swinging slowly around level
struct SimImu {
    started: Option<Instant>,
    poll_interval: Duration,
    amplitude_deg: f64,
    period_s: f64,
    settings_file: PathBuf,
    slerp_power: f64,
}

impl ImuDriver for SimImu {
    fn init(&mut self) -> Result<(), HardwareError> {
        if self.period_s <= 0.0 {
            return Err(HardwareError::Init {
                device: "imu",
                reason: format!("invalid simulated period {}s", self.period_s),
            });
        }
        info!(
            "Simulated IMU (settings {}, slerp power {})",
            self.settings_file.display(),
            self.slerp_power
        );
        self.started = Some(Instant::now());
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn read(&mut self) -> Result<Option<FusionAngles>, HardwareError> {
        let started = self.started.ok_or(HardwareError::Read {
            device: "imu",
            reason: "not initialised".into(),
        })?;
        let phase = 2.0 * PI * started.elapsed().as_secs_f64() / self.period_s;
        Ok(Some(FusionAngles {
            phi: (self.amplitude_deg * phase.sin()).to_radians(),
            theta: (0.5 * self.amplitude_deg * (2.0 * phase).cos()).to_radians(),
        }))
    }
}

/// HX711 under a constant load with a little conversion ripple
struct SimGauge {
    offset_counts: f64,
    scale_ratio: f64,
    load_kg: f64,
    sample_delay: Duration,
    samples: u64,
}

impl StrainGauge for SimGauge {
    fn read_raw(&mut self) -> Result<i32, HardwareError> {
        thread::sleep(self.sample_delay);
        self.samples += 1;
        let ripple = (self.samples % 7) as f64 - 3.0;
        Ok((self.offset_counts + self.scale_ratio * self.load_kg + ripple).round() as i32)
    }
}

/// Servo output reporting the pulse width it would generate
struct SimServo {
    position: ServoPosition,
    pin: u8,
    calibration: ServoCalibration,
    pulse_us: Option<f64>,
}

impl Servo for SimServo {
    fn set_angle(&mut self, degrees: f64) -> Result<(), HardwareError> {
        let pulse = self.calibration.pulse_width_us(degrees);
        if self.pulse_us != Some(pulse) {
            trace!(
                "{} servo (GPIO{}): {:.1}° -> {:.0} μs",
                self.position,
                self.pin,
                degrees,
                pulse
            );
        }
        self.pulse_us = Some(pulse);
        Ok(())
    }
}
