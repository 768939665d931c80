//! Vehicle heading hold
//!
//! When no turn rate is demanded the vehicle holds its heading, either at the
//! last explicitly requested goal or at whatever heading it had when the turn
//! rate went to zero. The goal is approached along a trapezoidal profile
//! (limited turn rate and angular acceleration) which a wrapping PID tracks,
//! with the profile rate fed forward.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use serde::Serialize;
use std::f64::consts::TAU;

use super::DriveCtrlError;
use crate::pid::{ContinuousPid, PidError, PidParams};
use util::maths::{norm_angle, wrap_dist};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HoldState {
    /// A turn rate is being commanded directly.
    Idle,

    /// No turn rate is commanded, the controller is holding the goal.
    Holding,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A point on the heading profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProfileSetpoint {
    /// Units: radians, range [0, 2pi)
    pub heading_rad: f64,

    /// Units: radians/second
    pub rate_rads: f64,
}

pub struct HeadingHold {
    pid: ContinuousPid,

    max_rate_rads: f64,
    max_accel_radss: f64,
    tolerance_rad: f64,

    state: HoldState,
    goal_rad: Option<f64>,
    setpoint: ProfileSetpoint,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeadingHold {
    pub fn new(
        pid_params: PidParams,
        max_rate_rads: f64,
        max_accel_radss: f64,
        tolerance_rad: f64,
    ) -> Result<Self, DriveCtrlError> {
        let pid = ContinuousPid::new(pid_params.with_wrap_period(TAU))?;

        for (v, name) in [
            (max_rate_rads, "heading_max_rate_rads"),
            (max_accel_radss, "heading_max_accel_radss"),
            (tolerance_rad, "heading_tolerance_rad"),
        ]
        .iter()
        {
            if !(*v > 0.0) || !v.is_finite() {
                return Err(DriveCtrlError::InvalidArgument(format!(
                    "{} must be positive, found {}",
                    name, v
                )));
            }
        }

        Ok(Self {
            pid,
            max_rate_rads,
            max_accel_radss,
            tolerance_rad,
            state: HoldState::Idle,
            goal_rad: None,
            setpoint: ProfileSetpoint::default(),
        })
    }

    pub fn state(&self) -> HoldState {
        self.state
    }

    pub fn goal(&self) -> Option<f64> {
        self.goal_rad
    }

    pub fn setpoint(&self) -> ProfileSetpoint {
        self.setpoint
    }

    /// Set the heading to hold.
    ///
    /// With `reset_profile` the profile restarts from the measured heading and
    /// rate, otherwise it continues from where it is and bends toward the new
    /// goal.
    pub fn set_goal(
        &mut self,
        goal_rad: f64,
        measured_rad: f64,
        rate_rads: f64,
        reset_profile: bool,
    ) {
        self.goal_rad = Some(norm_angle(goal_rad));

        if reset_profile {
            self.reseed(measured_rad, rate_rads);
        }
    }

    /// Restart the profile and controller from the measured heading and rate.
    pub fn reseed(&mut self, measured_rad: f64, rate_rads: f64) {
        let rate_rads = if rate_rads.is_finite() { rate_rads } else { 0.0 };

        self.setpoint = ProfileSetpoint {
            heading_rad: norm_angle(measured_rad),
            rate_rads: rate_rads.clamp(-self.max_rate_rads, self.max_rate_rads),
        };
        self.pid.reset(measured_rad);
    }

    /// The heading measurement jumped (e.g. after a pose reset). Any explicit
    /// goal is dropped, if holding the new heading is held.
    pub fn rebase(&mut self, measured_rad: f64, rate_rads: f64) {
        self.goal_rad = match self.state {
            HoldState::Holding => Some(norm_angle(measured_rad)),
            HoldState::Idle => None,
        };
        self.reseed(measured_rad, rate_rads);
    }

    /// Stop holding and forget the goal.
    pub fn release(&mut self) {
        if self.state == HoldState::Holding {
            debug!("Heading hold released");
        }
        self.state = HoldState::Idle;
        self.goal_rad = None;
    }

    /// Get the turn rate to command this cycle.
    ///
    /// If `requested_rate_rads` is non-zero it is passed straight through and
    /// any hold is abandoned. If it is exactly zero the hold engages.
    pub fn update(
        &mut self,
        measured_rad: f64,
        rate_rads: f64,
        requested_rate_rads: f64,
        dt_s: f64,
    ) -> Result<f64, PidError> {
        if requested_rate_rads != 0.0 {
            if self.state == HoldState::Holding {
                debug!("Heading hold abandoned for commanded turn rate");
                self.release();
            }
            return Ok(requested_rate_rads);
        }

        if self.state == HoldState::Idle {
            let goal = *self.goal_rad.get_or_insert(norm_angle(measured_rad));
            debug!("Heading hold engaged, goal {:.3} rad", goal);

            self.state = HoldState::Holding;
            self.reseed(measured_rad, rate_rads);
        }

        let goal_rad = *self.goal_rad.get_or_insert(norm_angle(measured_rad));
        self.step_profile(goal_rad, dt_s);

        let correction = self.pid.compute(measured_rad, self.setpoint.heading_rad, dt_s)?;

        Ok(self.setpoint.rate_rads + correction)
    }

    /// `true` while holding with both the measured heading and the profile
    /// within tolerance of the goal.
    pub fn goal_reached(&self, measured_rad: f64) -> bool {
        match (self.state, self.goal_rad) {
            (HoldState::Holding, Some(goal)) => {
                wrap_dist(measured_rad, goal, TAU).abs() <= self.tolerance_rad
                    && wrap_dist(self.setpoint.heading_rad, goal, TAU).abs()
                        <= self.tolerance_rad
            }
            _ => false,
        }
    }

    /// Advance the trapezoidal profile one step toward `goal_rad`.
    fn step_profile(&mut self, goal_rad: f64, dt_s: f64) {
        let sp = &mut self.setpoint;
        let dist_rad = wrap_dist(sp.heading_rad, goal_rad, TAU);

        // Fastest rate from which the goal can still be reached without
        // overshoot
        let stop_rate_rads = (2.0 * self.max_accel_radss * dist_rad.abs()).sqrt();
        let target_rate_rads = dist_rad.signum() * stop_rate_rads.min(self.max_rate_rads);

        let max_dv = self.max_accel_radss * dt_s;
        sp.rate_rads += (target_rate_rads - sp.rate_rads).clamp(-max_dv, max_dv);

        let step_rad = sp.rate_rads * dt_s;

        if dist_rad * step_rad >= 0.0 && step_rad.abs() >= dist_rad.abs() {
            sp.heading_rad = goal_rad;
            sp.rate_rads = 0.0;
        } else {
            sp.heading_rad = norm_angle(sp.heading_rad + step_rad);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn hold() -> HeadingHold {
        HeadingHold::new(PidParams::new(2.0, 0.0, 0.0, 4.0, 0.5), 2.0, 4.0, 0.02).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let mut h = hold();
        assert_eq!(h.state(), HoldState::Idle);

        // Non-zero rate passes through
        assert_eq!(h.update(1.0, 0.0, 0.7, 0.02).unwrap(), 0.7);
        assert_eq!(h.state(), HoldState::Idle);

        // Zero rate engages the hold on the same cycle, at the current heading
        let w = h.update(1.0, 0.0, 0.0, 0.02).unwrap();
        assert_eq!(h.state(), HoldState::Holding);
        assert!((h.goal().unwrap() - 1.0).abs() < 1e-12);
        assert!(w.abs() < 1e-9);

        // And a non-zero rate drops it immediately, abandoning the goal
        assert_eq!(h.update(1.0, 0.0, -0.1, 0.02).unwrap(), -0.1);
        assert_eq!(h.state(), HoldState::Idle);
        assert_eq!(h.goal(), None);
    }

    #[test]
    fn test_explicit_goal_survives_idle() {
        let mut h = hold();
        h.set_goal(FRAC_PI_2, 0.0, 0.0, true);
        h.update(0.0, 0.0, 0.5, 0.02).unwrap();
        assert_eq!(h.goal(), Some(FRAC_PI_2));

        // Holding picks up the explicit goal, not the current heading
        let w = h.update(0.0, 0.0, 0.0, 0.02).unwrap();
        assert_eq!(h.goal(), Some(FRAC_PI_2));
        assert!(w > 0.0);
    }

    #[test]
    fn test_profile_respects_limits() {
        let mut h = hold();
        h.set_goal(PI, 0.0, 0.0, true);

        let dt = 0.02;
        let mut prev = h.setpoint();
        for _ in 0..500 {
            // Simulate a perfect follower
            let measured = h.setpoint().heading_rad;
            h.update(measured, h.setpoint().rate_rads, 0.0, dt).unwrap();

            let sp = h.setpoint();
            assert!(sp.rate_rads.abs() <= 2.0 + 1e-12);
            // Snapping to the goal is the one allowed jump in rate
            if sp.heading_rad != PI {
                assert!((sp.rate_rads - prev.rate_rads).abs() <= 4.0 * dt + 1e-9);
            }
            prev = sp;
        }

        assert_eq!(h.setpoint().heading_rad, PI);
        assert_eq!(h.setpoint().rate_rads, 0.0);
        assert!(h.goal_reached(PI));
        assert!(!h.goal_reached(PI + 0.1));
    }

    #[test]
    fn test_profile_takes_shortest_way() {
        let mut h = hold();
        h.set_goal(TAU - 0.5, 0.2, 0.0, true);
        h.update(0.2, 0.0, 0.0, 0.02).unwrap();
        assert!(h.setpoint().rate_rads < 0.0);
    }

    #[test]
    fn test_goal_reached_needs_holding() {
        let mut h = hold();
        h.set_goal(1.0, 1.0, 0.0, true);
        assert!(!h.goal_reached(1.0));

        h.update(1.0, 0.0, 0.0, 0.02).unwrap();
        assert!(h.goal_reached(1.0));
    }

    #[test]
    fn test_rebase() {
        let mut h = hold();
        h.update(1.0, 0.0, 0.0, 0.02).unwrap();
        h.rebase(3.0, 0.0);
        assert_eq!(h.goal(), Some(3.0));
        assert_eq!(h.setpoint().heading_rad, 3.0);

        h.release();
        h.rebase(2.0, 0.0);
        assert_eq!(h.goal(), None);
    }

    #[test]
    fn test_invalid_profile() {
        assert!(HeadingHold::new(PidParams::new(1.0, 0.0, 0.0, 1.0, 0.0), 0.0, 1.0, 0.1).is_err());
    }
}
