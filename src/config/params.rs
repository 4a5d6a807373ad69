//! Default rig parameters

/// Attitude PID gains (shared by the roll and pitch axes)
pub const DEFAULT_PID_KP: f64 = 0.5;
pub const DEFAULT_PID_KI: f64 = 0.02;
pub const DEFAULT_PID_KD: f64 = 0.001;

/// Bound on the integral contribution |Ki * ∫e dt| [deg]
pub const DEFAULT_PID_INTEGRAL_LIMIT: f64 = 15.0;

/// Bound on the PID output used as the calibration key [deg]
pub const DEFAULT_PID_OUTPUT_LIMIT: f64 = 25.0;

/// Servo travel [deg]
pub const SERVO_MIN_ANGLE: f64 = -90.0;
pub const SERVO_MAX_ANGLE: f64 = 90.0;

/// Servo pulse widths [μs] (20 ms frame)
pub const SERVO_MIN_PULSE_US: f64 = 750.0;
pub const SERVO_MAX_PULSE_US: f64 = 2200.0;
/// The back servo needs a slightly longer minimum pulse
pub const BACK_SERVO_MIN_PULSE_US: f64 = 770.0;

/// Servo GPIO pins (BCM numbering)
pub mod servo_pins {
    pub const RIGHT: u8 = 12;
    pub const LEFT: u8 = 16;
    pub const FRONT: u8 = 20;
    pub const BACK: u8 = 21;
}

/// HX711 wiring (BCM numbering). All four amplifiers share one clock line.
pub mod load_cell_pins {
    pub const SCK: u8 = 5;
    pub const DOUT: [u8; 4] = [6, 13, 19, 26];
}

/// Counts per kilogram for each load cell, from the bench calibration
pub const LOAD_CELL_SCALE_RATIOS: [f64; 4] = [-203_140.0, -209_464.0, 211_106.0, -200_515.0];

/// Standard gravity [m/s²]
pub const GRAVITY: f64 = 9.81;

/// Samples averaged per channel on every load cell loop iteration
pub const MEASURE_WINDOW: usize = 2;

/// Samples averaged per channel per weigh round
pub const WEIGH_WINDOW: usize = 5;

/// Number of weigh rounds averaged into a single weight
pub const WEIGH_ROUNDS: usize = 5;

/// Samples averaged when zeroing a channel
pub const TARE_WINDOW: usize = 30;

/// Stopwatch publish period [ms] (centisecond display)
pub const STOPWATCH_TICK_MS: u64 = 10;

/// Minimum load cell loop period [ms]
pub const LOADCELL_PERIOD_MS: u64 = 50;

/// Timeout for a single hardware read or write [ms]
pub const HARDWARE_TIMEOUT_MS: u64 = 2_000;

/// Timeout for weigh and tare, which average many samples [ms]
pub const CALIBRATION_TIMEOUT_MS: u64 = 30_000;

/// A fault is published on the first occurrence and then every N occurrences
pub const FAULT_REPORT_INTERVAL: u64 = 50;

/// Message broker defaults
pub mod broker {
    pub const HOST: &str = "localhost";
    pub const PORT: u16 = 1883;
    pub const CLIENT_ID: &str = "RPi";
    pub const KEEP_ALIVE_SECS: u64 = 60;
}

/// Default file locations
pub const CALIBRATION_TABLE_PATH: &str = "data/calibration_table.csv";
pub const SESSION_LOG_DIR: &str = "logs";
pub const IMU_SETTINGS_FILE: &str = "RTIMULib";

/// IMU fusion slerp power
pub const IMU_SLERP_POWER: f64 = 0.02;

/// Simulated hardware defaults
pub mod sim {
    /// Native poll interval of the simulated IMU [ms]
    pub const IMU_POLL_INTERVAL_MS: u64 = 4;
    /// Peak simulated attitude swing [deg]
    pub const ATTITUDE_AMPLITUDE_DEG: f64 = 8.0;
    /// Period of the simulated attitude swing [s]
    pub const ATTITUDE_PERIOD_S: f64 = 12.0;
    /// Static load on each simulated cell [kg]
    pub const CELL_LOAD_KG: f64 = 0.25;
    /// Raw reading of an unloaded simulated cell [counts]
    pub const CELL_OFFSET_COUNTS: f64 = 8_000.0;
    /// Conversion time of one simulated HX711 sample [μs]
    pub const SAMPLE_DELAY_US: u64 = 1_000;
}
