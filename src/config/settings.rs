//! Runtime configuration
//!
//! Every field falls back to the defaults in `params.rs`, so a config file
//! only needs to name what differs from the bench setup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::params;

/// Hardware backend driving the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Simulated IMU, load cells and servos
    #[default]
    Sim,
}

/// Complete rig configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub backend: Backend,
    pub broker: BrokerConfig,
    pub imu: ImuConfig,
    pub pid: PidConfig,
    pub servos: ServoBankConfig,
    pub load_cells: LoadCellConfig,
    pub timing: TimingConfig,
    pub sim: SimConfig,
    /// Calibration table (CSV: phi, theta, front, back, left, right)
    pub calibration_table: PathBuf,
    /// Directory receiving saved sessions
    pub log_dir: PathBuf,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            broker: BrokerConfig::default(),
            imu: ImuConfig::default(),
            pid: PidConfig::default(),
            servos: ServoBankConfig::default(),
            load_cells: LoadCellConfig::default(),
            timing: TimingConfig::default(),
            sim: SimConfig::default(),
            calibration_table: PathBuf::from(params::CALIBRATION_TABLE_PATH),
            log_dir: PathBuf::from(params::SESSION_LOG_DIR),
        }
    }
}

/// Message broker connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: params::broker::HOST.to_string(),
            port: params::broker::PORT,
            client_id: params::broker::CLIENT_ID.to_string(),
            keep_alive_secs: params::broker::KEEP_ALIVE_SECS,
        }
    }
}

/// IMU fusion engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Fusion engine settings file
    pub settings_file: PathBuf,
    /// Fusion slerp power (0.0-1.0)
    pub slerp_power: f64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            settings_file: PathBuf::from(params::IMU_SETTINGS_FILE),
            slerp_power: params::IMU_SLERP_POWER,
        }
    }
}

/// Attitude PID tuning
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Bound on |Ki * ∫e dt| [deg]
    pub integral_limit: f64,
    /// Symmetric output bound [deg]
    pub output_limit: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: params::DEFAULT_PID_KP,
            ki: params::DEFAULT_PID_KI,
            kd: params::DEFAULT_PID_KD,
            integral_limit: params::DEFAULT_PID_INTEGRAL_LIMIT,
            output_limit: params::DEFAULT_PID_OUTPUT_LIMIT,
        }
    }
}

/// One angular servo
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// GPIO pin (BCM)
    pub pin: u8,
    /// Pulse width at the minimum angle [μs]
    pub min_pulse_us: f64,
    /// Pulse width at the maximum angle [μs]
    pub max_pulse_us: f64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            pin: 0,
            min_pulse_us: params::SERVO_MIN_PULSE_US,
            max_pulse_us: params::SERVO_MAX_PULSE_US,
        }
    }
}

impl ServoConfig {
    fn on_pin(pin: u8) -> Self {
        Self {
            pin,
            ..Self::default()
        }
    }
}

/// The four actuator servos and their shared travel
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServoBankConfig {
    pub min_angle: f64,
    pub max_angle: f64,
    pub front: ServoConfig,
    pub back: ServoConfig,
    pub left: ServoConfig,
    pub right: ServoConfig,
}

impl Default for ServoBankConfig {
    fn default() -> Self {
        Self {
            min_angle: params::SERVO_MIN_ANGLE,
            max_angle: params::SERVO_MAX_ANGLE,
            front: ServoConfig::on_pin(params::servo_pins::FRONT),
            back: ServoConfig {
                min_pulse_us: params::BACK_SERVO_MIN_PULSE_US,
                ..ServoConfig::on_pin(params::servo_pins::BACK)
            },
            left: ServoConfig::on_pin(params::servo_pins::LEFT),
            right: ServoConfig::on_pin(params::servo_pins::RIGHT),
        }
    }
}

/// One strain-gauge amplifier channel
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LoadCellChannelConfig {
    /// Data pin (BCM)
    pub dout_pin: u8,
    /// Counts per kilogram
    pub scale_ratio: f64,
}

/// The load cell array and its averaging windows
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoadCellConfig {
    /// Shared clock pin (BCM)
    pub sck_pin: u8,
    pub channels: [LoadCellChannelConfig; 4],
    /// Gravity used to convert mass to force [m/s²]
    pub gravity: f64,
    pub measure_window: usize,
    pub weigh_window: usize,
    pub weigh_rounds: usize,
    pub tare_window: usize,
}

impl Default for LoadCellConfig {
    fn default() -> Self {
        let channels = std::array::from_fn(|i| LoadCellChannelConfig {
            dout_pin: params::load_cell_pins::DOUT[i],
            scale_ratio: params::LOAD_CELL_SCALE_RATIOS[i],
        });
        Self {
            sck_pin: params::load_cell_pins::SCK,
            channels,
            gravity: params::GRAVITY,
            measure_window: params::MEASURE_WINDOW,
            weigh_window: params::WEIGH_WINDOW,
            weigh_rounds: params::WEIGH_ROUNDS,
            tare_window: params::TARE_WINDOW,
        }
    }
}

/// Loop periods and hardware timeouts
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub stopwatch_tick_ms: u64,
    pub loadcell_period_ms: u64,
    pub hardware_timeout_ms: u64,
    pub calibration_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stopwatch_tick_ms: params::STOPWATCH_TICK_MS,
            loadcell_period_ms: params::LOADCELL_PERIOD_MS,
            hardware_timeout_ms: params::HARDWARE_TIMEOUT_MS,
            calibration_timeout_ms: params::CALIBRATION_TIMEOUT_MS,
        }
    }
}

impl TimingConfig {
    pub fn stopwatch_tick(&self) -> Duration {
        Duration::from_millis(self.stopwatch_tick_ms)
    }

    pub fn loadcell_period(&self) -> Duration {
        Duration::from_millis(self.loadcell_period_ms)
    }

    pub fn hardware_timeout(&self) -> Duration {
        Duration::from_millis(self.hardware_timeout_ms)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_timeout_ms)
    }
}

/// Simulated hardware behaviour
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub imu_poll_interval_ms: u64,
    pub attitude_amplitude_deg: f64,
    pub attitude_period_s: f64,
    pub cell_load_kg: f64,
    pub cell_offset_counts: f64,
    pub sample_delay_us: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            imu_poll_interval_ms: params::sim::IMU_POLL_INTERVAL_MS,
            attitude_amplitude_deg: params::sim::ATTITUDE_AMPLITUDE_DEG,
            attitude_period_s: params::sim::ATTITUDE_PERIOD_S,
            cell_load_kg: params::sim::CELL_LOAD_KG,
            cell_offset_counts: params::sim::CELL_OFFSET_COUNTS,
            sample_delay_us: params::sim::SAMPLE_DELAY_US,
        }
    }
}

impl RigConfig {
    /// Load the configuration from a JSON file, or use the defaults when no
    /// file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Reject values that would stall a loop or turn readings into NaN
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        for (name, value) in [
            ("timing.stopwatch_tick_ms", timing.stopwatch_tick_ms),
            ("timing.loadcell_period_ms", timing.loadcell_period_ms),
            ("timing.hardware_timeout_ms", timing.hardware_timeout_ms),
            ("timing.calibration_timeout_ms", timing.calibration_timeout_ms),
            ("sim.imu_poll_interval_ms", self.sim.imu_poll_interval_ms),
        ] {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }

        let cells = &self.load_cells;
        for (i, channel) in cells.channels.iter().enumerate() {
            if !channel.scale_ratio.is_finite() || channel.scale_ratio == 0.0 {
                bail!(
                    "load_cells.channels[{}].scale_ratio must be finite and non-zero, got {}",
                    i,
                    channel.scale_ratio
                );
            }
        }
        if !(cells.gravity.is_finite() && cells.gravity > 0.0) {
            bail!("load_cells.gravity must be positive, got {}", cells.gravity);
        }
        for (name, value) in [
            ("load_cells.measure_window", cells.measure_window),
            ("load_cells.weigh_window", cells.weigh_window),
            ("load_cells.weigh_rounds", cells.weigh_rounds),
            ("load_cells.tare_window", cells.tare_window),
        ] {
            if value == 0 {
                bail!("{} must be at least 1", name);
            }
        }

        let pid = &self.pid;
        if ![pid.kp, pid.ki, pid.kd, pid.integral_limit, pid.output_limit]
            .iter()
            .all(|gain| gain.is_finite())
        {
            bail!("pid gains and limits must be finite");
        }
        if pid.integral_limit < 0.0 || pid.output_limit <= 0.0 {
            bail!(
                "pid limits must be positive (integral_limit={}, output_limit={})",
                pid.integral_limit,
                pid.output_limit
            );
        }

        let servos = &self.servos;
        if !servos.min_angle.is_finite()
            || !servos.max_angle.is_finite()
            || servos.min_angle >= servos.max_angle
        {
            bail!(
                "servos.min_angle ({}) must be below servos.max_angle ({})",
                servos.min_angle,
                servos.max_angle
            );
        }
        for (name, servo) in [
            ("front", &servos.front),
            ("back", &servos.back),
            ("left", &servos.left),
            ("right", &servos.right),
        ] {
            if !servo.min_pulse_us.is_finite()
                || !servo.max_pulse_us.is_finite()
                || servo.min_pulse_us >= servo.max_pulse_us
            {
                bail!("servos.{}: min_pulse_us must be below max_pulse_us", name);
            }
        }

        if !(self.sim.attitude_period_s.is_finite() && self.sim.attitude_period_s > 0.0) {
            bail!(
                "sim.attitude_period_s must be positive, got {}",
                self.sim.attitude_period_s
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bench_setup() {
        let config = RigConfig::default();
        assert_eq!(config.backend, Backend::Sim);
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.pid.kp, 0.5);
        assert_eq!(config.servos.back.min_pulse_us, 770.0);
        assert_eq!(config.servos.left.pin, 16);
        assert_eq!(config.load_cells.channels[2].scale_ratio, 211_106.0);
        assert_eq!(config.load_cells.channels[3].dout_pin, 26);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: RigConfig = serde_json::from_str(
            r#"{ "broker": { "host": "rig.local" }, "pid": { "ki": 0.1 } }"#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "rig.local");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.pid.ki, 0.1);
        assert_eq!(config.pid.kp, 0.5);
        assert_eq!(config.timing.stopwatch_tick(), Duration::from_millis(10));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result: Result<RigConfig, _> = serde_json::from_str(r#"{ "backend": "gpio" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(RigConfig::default().validate().is_ok());
    }

    #[test]
    fn test_degenerate_values_are_rejected() {
        let cases = [
            r#"{ "timing": { "loadcell_period_ms": 0 } }"#,
            r#"{ "timing": { "stopwatch_tick_ms": 0 } }"#,
            r#"{ "timing": { "hardware_timeout_ms": 0 } }"#,
            r#"{ "sim": { "imu_poll_interval_ms": 0 } }"#,
            r#"{ "sim": { "attitude_period_s": 0.0 } }"#,
            r#"{ "load_cells": { "gravity": -9.81 } }"#,
            r#"{ "load_cells": { "measure_window": 0 } }"#,
            r#"{ "servos": { "min_angle": 30.0, "max_angle": -30.0 } }"#,
            r#"{ "pid": { "output_limit": 0.0 } }"#,
        ];
        for case in cases {
            let config: RigConfig = serde_json::from_str(case).unwrap();
            assert!(config.validate().is_err(), "accepted {}", case);
        }
    }

    #[test]
    fn test_zero_scale_ratio_is_rejected() {
        let mut config = RigConfig::default();
        config.load_cells.channels[1].scale_ratio = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channels[1]"));
    }

    #[test]
    fn test_load_validates_file() {
        let path = std::env::temp_dir().join(format!(
            "thrust-stand-bad-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "timing": { "loadcell_period_ms": 0 } }"#).unwrap();
        let err = RigConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("loadcell_period_ms"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("thrust-stand-no-such-config.json");
        assert!(RigConfig::load(Some(&path)).is_err());
        assert!(RigConfig::load(None).is_ok());
    }
}
