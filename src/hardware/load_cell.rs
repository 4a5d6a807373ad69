//! Load cell array
//!
//! Four strain-gauge channels, one per motor, each with its own zero offset
//! and scale ratio. Raw counts are converted to mass with
//! `(counts - offset) / scale_ratio` and to force with the configured
//! gravity.

use std::fmt;

use tracing::{info, warn};

use super::StrainGauge;
use crate::config::LoadCellConfig;
use crate::error::HardwareError;

/// Load cell channel, numbered as on the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motor {
    Motor1,
    Motor2,
    Motor3,
    Motor4,
}

impl Motor {
    pub const ALL: [Motor; 4] = [Motor::Motor1, Motor::Motor2, Motor::Motor3, Motor::Motor4];

    pub fn name(self) -> &'static str {
        match self {
            Motor::Motor1 => "motor1",
            Motor::Motor2 => "motor2",
            Motor::Motor3 => "motor3",
            Motor::Motor4 => "motor4",
        }
    }
}

impl fmt::Display for Motor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Round to two decimal places
pub fn round_centi(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-motor thrust [N]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustSample {
    /// Unrounded channel forces
    pub motors: [f64; 4],
    /// Sum of the unrounded channel forces
    pub total: f64,
    /// Seconds since the session started
    pub timestamp: f64,
}

impl ThrustSample {
    pub fn new(motors: [f64; 4], timestamp: f64) -> Self {
        Self {
            motors,
            total: motors.iter().sum(),
            timestamp,
        }
    }

    /// Channel forces rounded for telemetry
    pub fn rounded_motors(&self) -> [f64; 4] {
        self.motors.map(round_centi)
    }

    /// Total rounded once, after summing
    pub fn rounded_total(&self) -> f64 {
        round_centi(self.total)
    }
}

/// Outcome of zeroing all four channels
#[derive(Debug, Default)]
pub struct TareReport {
    pub failed: Vec<(Motor, HardwareError)>,
}

impl TareReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_motors(&self) -> Vec<Motor> {
        self.failed.iter().map(|(motor, _)| *motor).collect()
    }
}

/// One strain-gauge channel with its calibration
pub struct LoadCell {
    gauge: Box<dyn StrainGauge>,
    /// Raw reading at zero load [counts]
    offset: f64,
    /// [counts/kg]
    scale_ratio: f64,
}

impl LoadCell {
    pub fn new(gauge: Box<dyn StrainGauge>, scale_ratio: f64) -> Self {
        Self {
            gauge,
            offset: 0.0,
            scale_ratio,
        }
    }

    fn read_mean_raw(&mut self, samples: usize) -> Result<f64, HardwareError> {
        let samples = samples.max(1);
        let mut sum = 0.0;
        for _ in 0..samples {
            sum += self.gauge.read_raw()? as f64;
        }
        Ok(sum / samples as f64)
    }

    /// Mean mass over `samples` readings [kg]
    pub fn read_mass(&mut self, samples: usize) -> Result<f64, HardwareError> {
        let raw = self.read_mean_raw(samples)?;
        Ok((raw - self.offset) / self.scale_ratio)
    }

    /// Take the mean of `samples` readings as the new zero offset
    pub fn zero(&mut self, samples: usize) -> Result<(), HardwareError> {
        self.offset = self.read_mean_raw(samples)?;
        Ok(())
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

/// The four load cells of the rig
pub struct LoadCellArray {
    cells: [LoadCell; 4],
    gravity: f64,
    measure_window: usize,
    weigh_window: usize,
    weigh_rounds: usize,
    tare_window: usize,
}

impl LoadCellArray {
    /// Create the array
    ///
    /// # Arguments
    /// * `gauges` - Amplifiers in motor order (motor1..motor4)
    /// * `config` - Scale ratios, gravity and averaging windows
    pub fn new(gauges: [Box<dyn StrainGauge>; 4], config: &LoadCellConfig) -> Self {
        let [g1, g2, g3, g4] = gauges;
        let ratio = |i: usize| config.channels[i].scale_ratio;
        Self {
            cells: [
                LoadCell::new(g1, ratio(0)),
                LoadCell::new(g2, ratio(1)),
                LoadCell::new(g3, ratio(2)),
                LoadCell::new(g4, ratio(3)),
            ],
            gravity: config.gravity,
            measure_window: config.measure_window,
            weigh_window: config.weigh_window,
            weigh_rounds: config.weigh_rounds.max(1),
            tare_window: config.tare_window,
        }
    }

    /// Loop measurement: short rolling average per channel, converted to force
    ///
    /// A failure on any channel fails the whole sample; the loop retries on
    /// its next iteration.
    pub fn measure(&mut self, timestamp: f64) -> Result<ThrustSample, HardwareError> {
        let mut motors = [0.0; 4];
        for (force, cell) in motors.iter_mut().zip(self.cells.iter_mut()) {
            *force = cell.read_mass(self.measure_window)? * self.gravity;
        }
        Ok(ThrustSample::new(motors, timestamp))
    }

    /// Static weight of everything on the rig [N]
    ///
    /// Averages `weigh_rounds` long-window readings per channel, sums the
    /// four channel averages and rounds once.
    pub fn weigh(&mut self) -> Result<f64, HardwareError> {
        let mut sums = [0.0; 4];
        for _ in 0..self.weigh_rounds {
            for (sum, cell) in sums.iter_mut().zip(self.cells.iter_mut()) {
                *sum += cell.read_mass(self.weigh_window)?;
            }
        }
        let mass: f64 = sums.iter().map(|sum| sum / self.weigh_rounds as f64).sum();
        let weight = round_centi(mass * self.gravity);
        info!("Weighed {} N", weight);
        Ok(weight)
    }

    /// Zero every channel. All four are attempted even if some fail.
    pub fn tare(&mut self) -> TareReport {
        let mut report = TareReport::default();
        for (motor, cell) in Motor::ALL.into_iter().zip(self.cells.iter_mut()) {
            match cell.zero(self.tare_window) {
                Ok(()) => info!("{} zeroed at {} counts", motor, cell.offset()),
                Err(e) => {
                    warn!("{} tare failed: {}", motor, e);
                    report.failed.push((motor, e));
                }
            }
        }
        report
    }
}
