//! Parameters structure for DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::{DriveCtrlError, NUM_MODULES};
use crate::kinematics::ModuleOffset;
use crate::module_ctrl::SteerMode;
use crate::pid::PidParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for drivetrain control.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    // ---- GEOMETRY ----
    /// Position of each module's steer axis relative to the centre of
    /// rotation, in the order front left, front right, rear left, rear right.
    ///
    /// Units: meters,
    /// Frame: Robot body
    pub module_offsets_m: [ModuleOffset; NUM_MODULES],

    /// Radius of the drive wheels.
    ///
    /// Units: meters
    pub wheel_radius_m: f64,

    // ---- CAPABILITIES ----
    /// Maximum magnitude of the commanded vehicle translation.
    ///
    /// Units: meters/second
    pub max_linear_speed_ms: f64,

    /// Maximum magnitude of the commanded vehicle turn rate.
    ///
    /// Units: radians/second
    pub max_angular_speed_rads: f64,

    /// Maximum ground speed of any single module. All module speeds are scaled
    /// down together if one would exceed this.
    ///
    /// Units: meters/second
    pub max_module_speed_ms: f64,

    // ---- MODULES ----
    /// How the steer axes are controlled.
    pub steer_mode: SteerMode,

    /// Steer position loop gains, used in `Looped` steer mode. Output is the
    /// steer motor rate in radians/second.
    pub steer_pid: PidParams,

    // ---- HEADING HOLD ----
    /// Heading hold gains. Output is a turn rate correction in
    /// radians/second.
    pub heading_pid: PidParams,

    /// Maximum turn rate of the heading profile.
    ///
    /// Units: radians/second
    pub heading_max_rate_rads: f64,

    /// Maximum angular acceleration of the heading profile.
    ///
    /// Units: radians/second^2
    pub heading_max_accel_radss: f64,

    /// Heading error within which the goal is considered reached.
    ///
    /// Units: radians
    pub heading_tolerance_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the limits are usable. Geometry and controller gains are checked
    /// by the components which use them.
    pub fn validate(&self) -> Result<(), DriveCtrlError> {
        let limits = [
            (self.wheel_radius_m, "wheel_radius_m"),
            (self.max_linear_speed_ms, "max_linear_speed_ms"),
            (self.max_angular_speed_rads, "max_angular_speed_rads"),
            (self.max_module_speed_ms, "max_module_speed_ms"),
        ];

        for (v, name) in limits.iter() {
            if !(*v > 0.0) || !v.is_finite() {
                return Err(DriveCtrlError::InvalidArgument(format!(
                    "{} must be positive, found {}",
                    name, v
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
