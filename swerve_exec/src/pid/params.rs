//! Parameters structure for the continuous PID controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::PidError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Configuration of a [`super::ContinuousPid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidParams {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Lowest output the controller may produce.
    pub output_min: f64,

    /// Highest output the controller may produce.
    pub output_max: f64,

    /// Maximum magnitude of the accumulated integral (anti-windup).
    ///
    /// Units: error units * seconds
    pub max_integral: f64,

    /// Maximum rate of change of the output, or `None` for no ramp limit.
    ///
    /// Units: output units/second
    #[serde(default)]
    pub output_ramp_rate: Option<f64>,

    /// Strength of the output low-pass filter in [0, 1). 0 disables the
    /// filter, values closer to 1 weight the previous output more heavily.
    #[serde(default)]
    pub output_filter: f64,

    /// Period of a wrapping measurement domain, e.g. 2pi for angles, or
    /// `None` if the domain is linear.
    #[serde(default)]
    pub wrap_period: Option<f64>,

    /// Furthest the setpoint may lie from the measurement, or `None` for no
    /// limit. Setpoints further away are pulled in to this distance, which
    /// bounds the error seen by every term.
    #[serde(default)]
    pub setpoint_range: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidParams {
    /// Plain PID gains with a symmetric output limit and no filtering, ramp
    /// limiting or wrapping.
    pub fn new(k_p: f64, k_i: f64, k_d: f64, output_limit: f64, max_integral: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            output_min: -output_limit,
            output_max: output_limit,
            max_integral,
            output_ramp_rate: None,
            output_filter: 0.0,
            wrap_period: None,
            setpoint_range: None,
        }
    }

    /// Make the measurement domain wrap with the given period.
    pub fn with_wrap_period(mut self, period: f64) -> Self {
        self.wrap_period = Some(period);
        self
    }

    /// Limit how far the setpoint may lie from the measurement.
    pub fn with_setpoint_range(mut self, range: f64) -> Self {
        self.setpoint_range = Some(range);
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), PidError> {
        let gains = [self.k_p, self.k_i, self.k_d];
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(PidError::InvalidArgument("gains must be finite"));
        }

        if !(self.output_min <= self.output_max) {
            return Err(PidError::InvalidArgument(
                "output_min must not be greater than output_max",
            ));
        }

        if !(self.max_integral >= 0.0) {
            return Err(PidError::InvalidArgument("max_integral must be non-negative"));
        }

        if let Some(r) = self.output_ramp_rate {
            if !(r > 0.0) {
                return Err(PidError::InvalidArgument("output_ramp_rate must be positive"));
            }
        }

        if !(0.0..1.0).contains(&self.output_filter) {
            return Err(PidError::InvalidArgument("output_filter must be in [0, 1)"));
        }

        if let Some(p) = self.wrap_period {
            if !(p > 0.0) || !p.is_finite() {
                return Err(PidError::InvalidArgument("wrap_period must be positive"));
            }
        }

        if let Some(r) = self.setpoint_range {
            if !(r > 0.0) || !r.is_finite() {
                return Err(PidError::InvalidArgument("setpoint_range must be positive"));
            }
        }

        Ok(())
    }
}
