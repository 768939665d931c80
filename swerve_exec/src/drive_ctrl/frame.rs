//! Field to robot frame transform

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::kinematics::VehicleVelocity;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a velocity given in the field frame into the robot frame, given the
/// vehicle's heading in the field.
///
/// The translation is rotated by the negative of the heading, the turn rate is
/// the same in both frames.
pub fn field_to_robot(vel_field: &VehicleVelocity, heading_rad: f64) -> VehicleVelocity {
    let (s, c) = (-heading_rad).sin_cos();

    VehicleVelocity {
        vx_ms: vel_field.vx_ms * c - vel_field.vy_ms * s,
        vy_ms: vel_field.vx_ms * s + vel_field.vy_ms * c,
        omega_rads: vel_field.omega_rads,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
