//! # Swerve kinematics
//!
//! Transforms between the vehicle velocity and the velocity of each module.
//!
//! All frames are robot body frames: +X forward, +Y left, rotation positive
//! counter-clockwise about +Z.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use util::maths::norm_angle;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Singular values below this are treated as zero when inverting the module
/// geometry.
const PINV_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Velocity of the whole vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleVelocity {
    /// Forward speed
    ///
    /// Units: meters/second
    pub vx_ms: f64,

    /// Leftward speed
    ///
    /// Units: meters/second
    pub vy_ms: f64,

    /// Counter-clockwise turn rate
    ///
    /// Units: radians/second
    pub omega_rads: f64,
}

/// Position of a module's steer axis relative to the vehicle's centre of
/// rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleOffset {
    pub x_m: f64,
    pub y_m: f64,
}

/// Speed and heading of a single module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Signed ground speed of the wheel
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Heading of the wheel in the robot frame
    ///
    /// Units: radians, range [0, 2pi)
    pub heading_rad: f64,
}

/// Kinematic model of a swerve vehicle with a fixed set of modules.
///
/// The order of the offsets given at construction is the module order used by
/// every array passed in or out.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    offsets: Vec<ModuleOffset>,

    /// Pseudo-inverse of the 2N x 3 matrix mapping vehicle velocity onto the
    /// stacked module velocity vectors.
    forward_matrix: DMatrix<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleVelocity {
    pub fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self {
            vx_ms,
            vy_ms,
            omega_rads,
        }
    }
}

impl ModuleOffset {
    pub fn new(x_m: f64, y_m: f64) -> Self {
        Self { x_m, y_m }
    }
}

impl ModuleState {
    pub fn new(speed_ms: f64, heading_rad: f64) -> Self {
        Self {
            speed_ms,
            heading_rad,
        }
    }

    /// Velocity vector of the module in the robot frame.
    pub fn vector(&self) -> (f64, f64) {
        (
            self.speed_ms * self.heading_rad.cos(),
            self.speed_ms * self.heading_rad.sin(),
        )
    }
}

impl SwerveKinematics {
    /// Build the kinematic model for the given module offsets.
    ///
    /// At least two modules at distinct positions are needed for the vehicle
    /// velocity to be recoverable from the module states.
    pub fn new(offsets: &[ModuleOffset]) -> Result<Self, KinematicsError> {
        if offsets.len() < 2 {
            return Err(KinematicsError::InvalidArgument(format!(
                "At least 2 modules are required, found {}",
                offsets.len()
            )));
        }

        if offsets
            .iter()
            .any(|o| !o.x_m.is_finite() || !o.y_m.is_finite())
        {
            return Err(KinematicsError::InvalidArgument(
                "Module offsets must be finite".into(),
            ));
        }

        // Rows [1, 0, -y] and [0, 1, x] for each module
        let n = offsets.len();
        let mut inverse_matrix = DMatrix::<f64>::zeros(2 * n, 3);
        for (i, o) in offsets.iter().enumerate() {
            inverse_matrix[(2 * i, 0)] = 1.0;
            inverse_matrix[(2 * i, 2)] = -o.y_m;
            inverse_matrix[(2 * i + 1, 1)] = 1.0;
            inverse_matrix[(2 * i + 1, 2)] = o.x_m;
        }

        let forward_matrix = inverse_matrix
            .clone()
            .pseudo_inverse(PINV_EPSILON)
            .map_err(|e| KinematicsError::InvalidArgument(e.into()))?;

        // If all modules sit on the same point the turn rate can't be
        // recovered, which shows up as pinv(A) * A not being the identity.
        let identity_err = (&forward_matrix * &inverse_matrix - DMatrix::<f64>::identity(3, 3))
            .amax();
        if identity_err > 1e-6 {
            return Err(KinematicsError::InvalidArgument(
                "Module offsets do not constrain the turn rate".into(),
            ));
        }

        Ok(Self {
            offsets: offsets.to_vec(),
            forward_matrix,
        })
    }

    pub fn num_modules(&self) -> usize {
        self.offsets.len()
    }

    pub fn offsets(&self) -> &[ModuleOffset] {
        &self.offsets
    }

    /// Calculate the state each module must take to achieve the given vehicle
    /// velocity.
    ///
    /// Speeds are not limited here. A module with zero speed is given a
    /// heading of zero, callers which care about holding heading at rest must
    /// handle that themselves.
    pub fn inverse(&self, vel: &VehicleVelocity) -> Vec<ModuleState> {
        self.offsets
            .iter()
            .map(|o| {
                let vx = vel.vx_ms - vel.omega_rads * o.y_m;
                let vy = vel.vy_ms + vel.omega_rads * o.x_m;

                ModuleState {
                    speed_ms: vx.hypot(vy),
                    heading_rad: norm_angle(vy.atan2(vx)),
                }
            })
            .collect()
    }

    /// Estimate the vehicle velocity from measured module states.
    ///
    /// The result is the least-squares fit across all modules, so disagreeing
    /// modules (e.g. a slipping wheel) are averaged out rather than trusted.
    pub fn forward(&self, states: &[ModuleState]) -> Result<VehicleVelocity, KinematicsError> {
        if states.len() != self.offsets.len() {
            return Err(KinematicsError::InvalidArgument(format!(
                "Expected {} module states, found {}",
                self.offsets.len(),
                states.len()
            )));
        }

        let module_vels = DVector::from_iterator(
            2 * states.len(),
            states.iter().flat_map(|s| {
                let (vx, vy) = s.vector();
                vec![vx, vy]
            }),
        );

        let vel = &self.forward_matrix * module_vels;

        Ok(VehicleVelocity {
            vx_ms: vel[0],
            vy_ms: vel[1],
            omega_rads: vel[2],
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
