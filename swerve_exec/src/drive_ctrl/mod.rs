//! # Drivetrain control module
//!
//! Coordinates the four swerve modules. Each cycle DriveCtrl:
//!
//! 1. Reads the measured module states and the heading sensor
//! 2. Updates the odometry
//! 3. Computes the turn rate (commanded, or from heading hold)
//! 4. Converts the vehicle velocity into module demands and desaturates them
//! 5. Dispatches the demands and runs each module's periodic processing
//! 6. Publishes a telemetry snapshot
//!
//! Commands are applied through the methods on [`DriveCtrl`] and take effect
//! on the next cycle. The latest command always wins.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cmd;
mod frame;
mod heading_hold;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::eqpt::{EqptError, HeadingSensor};
use crate::kinematics::KinematicsError;
use crate::module_ctrl::{ModuleCtrlError, ModuleEqpt};
use crate::odometry::OdometryError;
use crate::pid::PidError;

pub use cmd::*;
pub use frame::field_to_robot;
pub use heading_hold::{HeadingHold, HoldState, ProfileSetpoint};
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of swerve modules on the vehicle.
pub const NUM_MODULES: usize = 4;

/// Modules demanded slower than this keep their previous heading rather than
/// turning to face an arbitrary direction.
///
/// Units: meters/second
pub const MIN_MODULE_SPEED_MS: f64 = 1e-3;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during DriveCtrl operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriveCtrlError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Kinematics error: {0}")]
    KinematicsError(#[from] KinematicsError),

    #[error("Module error: {0}")]
    ModuleCtrlError(#[from] ModuleCtrlError),

    #[error("Odometry error: {0}")]
    OdometryError(#[from] OdometryError),

    #[error("Heading hold error: {0}")]
    PidError(#[from] PidError),

    #[error("Equipment error: {0}")]
    EqptError(#[from] EqptError),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All equipment required by the drivetrain.
pub struct DriveEqpt {
    /// Module equipment in the order front left, front right, rear left, rear
    /// right.
    pub modules: Vec<ModuleEqpt>,

    pub heading: Box<dyn HeadingSensor>,
}
