//! # Continuous PID controller
//!
//! A PID controller which understands wrapping measurement domains. For an
//! angle the error between 0.1 and 2pi - 0.1 is 0.2, not nearly a full turn,
//! and the derivative is taken on the wrapped error so that crossing the wrap
//! boundary does not produce a spike.
//!
//! Each cycle the output is produced in the following order:
//!
//! 1. Error (shortest path if wrapping), limited by the setpoint range
//! 2. Integral accumulation and anti-windup clamp
//! 3. Derivative of the wrapped error
//! 4. Sum of terms, clamped to the output range
//! 5. Low-pass filter
//! 6. Ramp rate limit

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

pub use params::PidParams;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;
use util::maths::wrap_dist;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors produced by the controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PidError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller with optional wrap-around, anti-windup, output filtering
/// and output ramp limiting.
#[derive(Debug, Clone, Serialize)]
pub struct ContinuousPid {
    params: PidParams,

    /// The integral accumulation
    integral: f64,

    /// Output produced on the previous cycle
    last_output: f64,

    /// Error on the previous cycle
    prev_error: Option<f64>,

    /// Measurement the controller was re-seeded with, used in place of the
    /// previous error on the first cycle after a reset.
    seed_measurement: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ContinuousPid {
    /// Create a new controller from the given parameters.
    pub fn new(params: PidParams) -> Result<Self, PidError> {
        params.validate()?;

        Ok(Self {
            params,
            integral: 0.0,
            last_output: 0.0,
            prev_error: None,
            seed_measurement: None,
        })
    }

    /// Replace the controller's configuration.
    ///
    /// Controller memory is kept, but the integral is clamped into the new
    /// limit straight away.
    pub fn configure(&mut self, params: PidParams) -> Result<(), PidError> {
        params.validate()?;

        self.params = params;
        self.integral = self
            .integral
            .clamp(-params.max_integral, params.max_integral);

        Ok(())
    }

    pub fn params(&self) -> &PidParams {
        &self.params
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    /// Compute the controller output for this cycle.
    ///
    /// # Errors
    /// - `InvalidArgument` if `dt_s` is not strictly positive, or if either
    ///   input is not finite. The controller state is left untouched.
    pub fn compute(&mut self, measurement: f64, setpoint: f64, dt_s: f64) -> Result<f64, PidError> {
        if !(dt_s > 0.0) || !dt_s.is_finite() {
            return Err(PidError::InvalidArgument("dt must be strictly positive"));
        }
        if !measurement.is_finite() || !setpoint.is_finite() {
            return Err(PidError::InvalidArgument("measurement and setpoint must be finite"));
        }

        let p = self.params;

        let error = self.error(measurement, setpoint);

        // Accumulate and clamp the integral
        self.integral = (self.integral + error * dt_s)
            .clamp(-p.max_integral, p.max_integral);

        // If there's no history we assume no derivative rather than treating
        // the whole error as a step.
        let prev_error = match (self.prev_error, self.seed_measurement) {
            (Some(e), _) => Some(e),
            (None, Some(seed)) => Some(self.error(seed, setpoint)),
            (None, None) => None,
        };
        let deriv = match prev_error {
            Some(e) => self.error_delta(e, error) / dt_s,
            None => 0.0,
        };

        let raw = (p.k_p * error + p.k_i * self.integral + p.k_d * deriv)
            .clamp(p.output_min, p.output_max);

        let alpha = 1.0 - p.output_filter;
        let filtered = self.last_output * (1.0 - alpha) + raw * alpha;

        let ramped = match p.output_ramp_rate {
            Some(rate) => {
                let max_step = rate * dt_s;
                self.last_output + (filtered - self.last_output).clamp(-max_step, max_step)
            }
            None => filtered,
        };

        let output = ramped.clamp(p.output_min, p.output_max);

        self.last_output = output;
        self.prev_error = Some(error);
        self.seed_measurement = None;

        Ok(output)
    }

    /// Clear the controller's memory.
    ///
    /// Must be called whenever the measurement changes discontinuously (e.g.
    /// an encoder re-zero) so that neither the derivative nor the integral
    /// sees the jump.
    pub fn reset(&mut self, seed_measurement: f64) {
        self.integral = 0.0;
        self.last_output = 0.0;
        self.prev_error = None;
        self.seed_measurement = if seed_measurement.is_finite() {
            Some(seed_measurement)
        } else {
            None
        };
    }

    fn error(&self, measurement: f64, setpoint: f64) -> f64 {
        let error = match self.params.wrap_period {
            Some(period) => wrap_dist(measurement, setpoint, period),
            None => setpoint - measurement,
        };

        match self.params.setpoint_range {
            Some(range) => error.clamp(-range, range),
            None => error,
        }
    }

    fn error_delta(&self, prev_error: f64, error: f64) -> f64 {
        match self.params.wrap_period {
            Some(period) => wrap_dist(prev_error, error, period),
            None => error - prev_error,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{PI, TAU};

    fn p_only(k_p: f64) -> PidParams {
        PidParams::new(k_p, 0.0, 0.0, 100.0, 0.0).with_wrap_period(TAU)
    }

    #[test]
    fn test_wrapped_error_takes_shortest_path() {
        let mut pid = ContinuousPid::new(p_only(1.0)).unwrap();
        let out = pid.compute(TAU - 0.1, 0.1, 0.02).unwrap();
        assert!((out - 0.2).abs() < 1e-9, "output was {}", out);

        let mut pid = ContinuousPid::new(p_only(1.0)).unwrap();
        let out = pid.compute(0.1, TAU - 0.1, 0.02).unwrap();
        assert!((out + 0.2).abs() < 1e-9, "output was {}", out);
    }

    #[test]
    fn test_linear_domain() {
        let mut pid = ContinuousPid::new(PidParams::new(1.0, 0.0, 0.0, 100.0, 0.0)).unwrap();
        let out = pid.compute(TAU - 0.1, 0.1, 0.02).unwrap();
        assert!((out - (0.2 - TAU)).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_dt() {
        let mut pid = ContinuousPid::new(p_only(1.0)).unwrap();
        assert!(matches!(pid.compute(0.0, 1.0, 0.0), Err(PidError::InvalidArgument(_))));
        assert!(matches!(pid.compute(0.0, 1.0, -0.02), Err(PidError::InvalidArgument(_))));
        assert!(matches!(pid.compute(0.0, 1.0, f64::NAN), Err(PidError::InvalidArgument(_))));
        assert!(matches!(pid.compute(f64::NAN, 1.0, 0.02), Err(PidError::InvalidArgument(_))));

        // Rejected calls leave no trace
        assert_eq!(pid.last_output(), 0.0);
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn test_setpoint_range() {
        let mut pid =
            ContinuousPid::new(PidParams::new(1.0, 1.0, 0.0, 100.0, 100.0).with_setpoint_range(0.5))
                .unwrap();

        // A setpoint 3 away is treated as 0.5 away, in both the P and I terms
        let out = pid.compute(0.0, 3.0, 0.1).unwrap();
        assert!((out - (0.5 + 0.05)).abs() < 1e-9, "output was {}", out);

        let out = pid.compute(0.0, -3.0, 0.1).unwrap();
        assert!((out - (-0.5 + 0.0)).abs() < 1e-9, "output was {}", out);

        // Within range nothing changes
        let mut pid =
            ContinuousPid::new(p_only(2.0).with_setpoint_range(1.0)).unwrap();
        let out = pid.compute(TAU - 0.1, 0.1, 0.02).unwrap();
        assert!((out - 0.4).abs() < 1e-9, "output was {}", out);
    }

    #[test]
    fn test_invalid_params() {
        let mut p = p_only(1.0);
        p.output_min = 1.0;
        p.output_max = -1.0;
        assert!(ContinuousPid::new(p).is_err());

        let mut p = p_only(1.0);
        p.output_filter = 1.0;
        assert!(ContinuousPid::new(p).is_err());

        let mut p = p_only(1.0);
        p.output_ramp_rate = Some(0.0);
        assert!(ContinuousPid::new(p).is_err());

        let p = p_only(1.0).with_wrap_period(-TAU);
        assert!(ContinuousPid::new(p).is_err());

        let p = p_only(1.0).with_setpoint_range(0.0);
        assert!(ContinuousPid::new(p).is_err());
    }

    #[test]
    fn test_anti_windup() {
        let k_i = 0.8;
        let max_integral = 0.5;
        let mut pid = ContinuousPid::new(PidParams::new(0.0, k_i, 0.0, 100.0, max_integral))
            .unwrap();

        for _ in 0..1000 {
            let out = pid.compute(0.0, 50.0, 0.02).unwrap();
            assert!(out.abs() <= k_i * max_integral + 1e-12);
            assert!(pid.integral().abs() <= max_integral);
        }

        // Saturated at the limit, and recovers as soon as the error reverses
        assert!((pid.integral() - max_integral).abs() < 1e-12);
        pid.compute(0.0, -50.0, 0.02).unwrap();
        assert!(pid.integral() < max_integral);
    }

    #[test]
    fn test_derivative_no_spike_across_wrap() {
        let mut params = PidParams::new(0.0, 0.0, 1.0, 1000.0, 0.0).with_wrap_period(TAU);
        params.output_min = -1000.0;
        let mut pid = ContinuousPid::new(params).unwrap();

        // Measurement moves from just above zero to just below 2pi, a change
        // of 0.1 rad
        pid.compute(0.05, PI, 0.1).unwrap();
        let out = pid.compute(TAU - 0.05, PI, 0.1).unwrap();

        // d(error)/dt = +0.1 / 0.1 = 1.0, never ~2pi/0.1
        assert!((out - 1.0).abs() < 1e-9, "output was {}", out);
    }

    #[test]
    fn test_output_clamped() {
        let mut params = PidParams::new(10.0, 0.0, 0.0, 1.0, 0.0);
        params.output_min = -0.5;
        let mut pid = ContinuousPid::new(params).unwrap();

        assert_eq!(pid.compute(0.0, 5.0, 0.02).unwrap(), 1.0);
        assert_eq!(pid.compute(0.0, -5.0, 0.02).unwrap(), -0.5);
    }

    #[test]
    fn test_output_filter() {
        let mut params = PidParams::new(1.0, 0.0, 0.0, 10.0, 0.0);
        params.output_filter = 0.75;
        let mut pid = ContinuousPid::new(params).unwrap();

        // alpha = 0.25, the output moves a quarter of the way each cycle
        let o1 = pid.compute(0.0, 4.0, 0.02).unwrap();
        assert!((o1 - 1.0).abs() < 1e-12);
        let o2 = pid.compute(0.0, 4.0, 0.02).unwrap();
        assert!((o2 - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_output_ramp_rate() {
        let mut params = PidParams::new(1.0, 0.0, 0.0, 10.0, 0.0);
        params.output_ramp_rate = Some(5.0);
        let mut pid = ContinuousPid::new(params).unwrap();

        // 5 units/s over 0.1 s allows 0.5 per cycle
        assert!((pid.compute(0.0, 2.0, 0.1).unwrap() - 0.5).abs() < 1e-12);
        assert!((pid.compute(0.0, 2.0, 0.1).unwrap() - 1.0).abs() < 1e-12);
        assert!((pid.compute(0.0, -2.0, 0.1).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_reset_clears_memory() {
        let mut params = PidParams::new(1.0, 1.0, 1.0, 100.0, 10.0).with_wrap_period(TAU);
        params.output_ramp_rate = Some(1000.0);
        let mut pid = ContinuousPid::new(params).unwrap();

        for _ in 0..10 {
            pid.compute(0.0, 1.0, 0.02).unwrap();
        }
        assert!(pid.integral() > 0.0);

        // Encoder re-zero: the measurement jumps to 3.0. After the reset the
        // derivative is taken from the seed, so holding at the seed gives no
        // derivative kick.
        pid.reset(3.0);
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.last_output(), 0.0);

        let out = pid.compute(3.0, 3.5, 0.02).unwrap();
        let expected = 0.5 + 0.5 * 0.02;
        assert!((out - expected).abs() < 1e-9, "output was {}", out);
    }

    #[test]
    fn test_configure_clamps_integral() {
        let mut pid = ContinuousPid::new(PidParams::new(0.0, 1.0, 0.0, 100.0, 10.0)).unwrap();
        for _ in 0..100 {
            pid.compute(0.0, 10.0, 0.1).unwrap();
        }
        assert!((pid.integral() - 10.0).abs() < 1e-12);

        pid.configure(PidParams::new(0.0, 1.0, 0.0, 100.0, 2.0)).unwrap();
        assert_eq!(pid.integral(), 2.0);
    }
}
