// PID (Proportional-Integral-Derivative) controller with a bounded integral

/// PID controller tracking one attitude axis
///
/// The setpoint is passed on every update so it can follow the sliders
/// without disturbing the integral term. Time comes from the sample
/// timestamps, so the first update after a reset has no integral or
/// derivative contribution.
#[derive(Debug, Clone)]
pub struct PidController {
    /// Proportional gain
    kp: f64,
    /// Integral gain
    ki: f64,
    /// Derivative gain
    kd: f64,
    /// Integral accumulator (∫e dt)
    integral: f64,
    /// Bound on |ki * integral|
    integral_limit: f64,
    /// Minimum output limit
    output_min: f64,
    /// Maximum output limit
    output_max: f64,
    /// Error at the previous update
    prev_error: Option<f64>,
    /// Timestamp of the previous update [s]
    prev_timestamp: Option<f64>,
    /// Last calculated output
    last_output: f64,
}

impl PidController {
    /// Create a new PID controller
    ///
    /// # Arguments
    /// * `kp` - Proportional gain
    /// * `ki` - Integral gain
    /// * `kd` - Derivative gain
    /// * `integral_limit` - Bound on the integral contribution (anti-windup)
    /// * `output_limit` - Output limit (symmetric: ±output_limit)
    pub fn new(kp: f64, ki: f64, kd: f64, integral_limit: f64, output_limit: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            integral_limit: integral_limit.abs(),
            output_min: -output_limit.abs(),
            output_max: output_limit.abs(),
            prev_error: None,
            prev_timestamp: None,
            last_output: 0.0,
        }
    }

    /// Update the controller
    ///
    /// # Arguments
    /// * `setpoint` - Desired value
    /// * `measured` - Actual measured value
    /// * `timestamp` - Sample time (seconds, monotonic)
    ///
    /// # Returns
    /// Controller output (limited to output_min..output_max). A non-finite
    /// error or timestamp leaves the state untouched and returns the previous
    /// output.
    pub fn update(&mut self, setpoint: f64, measured: f64, timestamp: f64) -> f64 {
        let error = setpoint - measured;
        if !error.is_finite() || !timestamp.is_finite() {
            return self.last_output;
        }
        let dt = self
            .prev_timestamp
            .map(|prev| timestamp - prev)
            .filter(|dt| *dt > 0.0);

        let p_term = self.kp * error;

        if let Some(dt) = dt {
            self.integral += error * dt;
            if self.ki != 0.0 {
                let bound = self.integral_limit / self.ki.abs();
                self.integral = self.integral.clamp(-bound, bound);
            }
        }
        let i_term = self.ki * self.integral;

        let d_term = match (self.prev_error, dt) {
            (Some(prev_error), Some(dt)) => self.kd * (error - prev_error) / dt,
            _ => 0.0,
        };

        self.prev_error = Some(error);
        self.prev_timestamp = Some(timestamp);
        self.last_output = (p_term + i_term + d_term).clamp(self.output_min, self.output_max);
        self.last_output
    }

    /// Clear the integral, derivative history and output
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
        self.prev_timestamp = None;
        self.last_output = 0.0;
    }

    /// Get the current output
    pub fn get_output(&self) -> f64 {
        self.last_output
    }

    /// Get the current integral accumulator
    pub fn get_integral(&self) -> f64 {
        self.integral
    }
}
