//! Commands passed into DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::{clap::AppSettings, StructOpt};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command to be executed by the drivetrain.
///
/// Commands are not queued, a new command replaces the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, StructOpt)]
pub enum DriveCmd {
    /// Drive with a velocity given in the robot frame.
    ///
    /// A turn rate of exactly zero engages heading hold.
    #[structopt(name = "robot", setting = AppSettings::AllowNegativeNumbers)]
    Robot {
        /// Forward speed in meters/second
        vx_ms: f64,

        /// Leftward speed in meters/second
        vy_ms: f64,

        /// Counter-clockwise turn rate in radians/second
        omega_rads: f64,
    },

    /// Drive with a velocity given in the field frame.
    ///
    /// A turn rate of exactly zero engages heading hold.
    #[structopt(name = "field", setting = AppSettings::AllowNegativeNumbers)]
    Field {
        /// Speed along the field X axis in meters/second
        vx_ms: f64,

        /// Speed along the field Y axis in meters/second
        vy_ms: f64,

        /// Counter-clockwise turn rate in radians/second
        omega_rads: f64,
    },

    /// Turn to face the given field heading, keeping the current translation.
    #[structopt(name = "heading", setting = AppSettings::AllowNegativeNumbers)]
    Heading {
        /// Target heading in radians, counter-clockwise from the field X axis
        heading_rad: f64,
    },

    /// Bring the vehicle to a stop.
    #[structopt(name = "stop")]
    Stop,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCmd {
    /// Determine if the command is valid (i.e. contains only finite values).
    pub fn is_valid(&self) -> bool {
        match *self {
            DriveCmd::Robot {
                vx_ms,
                vy_ms,
                omega_rads,
            }
            | DriveCmd::Field {
                vx_ms,
                vy_ms,
                omega_rads,
            } => vx_ms.is_finite() && vy_ms.is_finite() && omega_rads.is_finite(),
            DriveCmd::Heading { heading_rad } => heading_rad.is_finite(),
            DriveCmd::Stop => true,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let cmd = DriveCmd::from_iter_safe(&["drive", "field", "1.0", "-0.5", "0"]).unwrap();
        assert_eq!(
            cmd,
            DriveCmd::Field {
                vx_ms: 1.0,
                vy_ms: -0.5,
                omega_rads: 0.0
            }
        );

        let cmd = DriveCmd::from_iter_safe(&["drive", "stop"]).unwrap();
        assert_eq!(cmd, DriveCmd::Stop);

        assert!(DriveCmd::from_iter_safe(&["drive", "robot", "1.0"]).is_err());
    }

    #[test]
    fn test_is_valid() {
        assert!(DriveCmd::Heading { heading_rad: 1.0 }.is_valid());
        assert!(!DriveCmd::Robot {
            vx_ms: f64::NAN,
            vy_ms: 0.0,
            omega_rads: 0.0
        }
        .is_valid());
    }
}
