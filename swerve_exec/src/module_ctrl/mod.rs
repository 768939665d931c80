//! # Module control
//!
//! Drives a single swerve module (one drive actuator and one steer actuator)
//! to a demanded speed and heading.
//!
//! ## Flip optimisation
//!
//! A wheel facing heading `h` with speed `s` moves the vehicle the same way as
//! one facing `h + pi` with speed `-s`. Each module keeps a flip flag which is
//! toggled whenever the demanded heading jumps by more than a quarter turn, so
//! the steer axis never needs to turn further than 90 degrees to follow a new
//! demand. The flag only affects actuation, measured states are always the
//! true physical wheel speed and heading.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::eqpt::{EqptError, PositionEncoder, VelocityActuator, WrappedPositionActuator};
use crate::pid::PidError;

pub use state::{ModuleCtrl, ModuleDems};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Metric used to compare a new heading demand against the previous one when
/// deciding whether to toggle the flip flag.
///
/// `Absolute` compares the raw difference of the normalised headings, so a
/// demand moving from 0.1 to 2pi - 0.1 is seen as a near full turn and never
/// toggles. `Shortest` uses the wrapped angular distance instead.
pub const FLIP_DELTA_MODE: FlipDeltaMode = FlipDeltaMode::Absolute;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Position of each module on the vehicle.
///
/// The discriminant is the module's index in every per-module array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleId {
    FrontLeft = 0,
    FrontRight = 1,
    RearLeft = 2,
    RearRight = 3,
}

/// How the heading change between two demands is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDeltaMode {
    Absolute,
    Shortest,
}

/// How the steer axis of a module reaches its demanded heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteerMode {
    /// The steer actuator closes its own position loop.
    Embedded,

    /// The module closes the loop on the steer encoder and drives the steer
    /// motor with a speed demand.
    Looped,
}

/// Steer equipment for a module, matching one of the [`SteerMode`]s.
pub enum SteerEqpt {
    Embedded(WrappedPositionActuator),
    Looped {
        motor: Box<dyn VelocityActuator>,
        encoder: Box<dyn PositionEncoder>,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModuleCtrlError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Equipment error: {0}")]
    EqptError(#[from] EqptError),

    #[error("Steer controller error: {0}")]
    PidError(#[from] PidError),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All equipment belonging to one module.
pub struct ModuleEqpt {
    pub drive: Box<dyn VelocityActuator>,
    pub steer: SteerEqpt,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleId {
    /// All modules in array order.
    pub const ALL: [ModuleId; 4] = [
        ModuleId::FrontLeft,
        ModuleId::FrontRight,
        ModuleId::RearLeft,
        ModuleId::RearRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl SteerEqpt {
    pub fn mode(&self) -> SteerMode {
        match self {
            SteerEqpt::Embedded(_) => SteerMode::Embedded,
            SteerEqpt::Looped { .. } => SteerMode::Looped,
        }
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleId::FrontLeft => "FL",
            ModuleId::FrontRight => "FR",
            ModuleId::RearLeft => "RL",
            ModuleId::RearRight => "RR",
        };
        write!(f, "{}", s)
    }
}
