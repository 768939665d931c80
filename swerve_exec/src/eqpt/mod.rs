//! # Equipment interfaces
//!
//! The drivetrain never talks to motor or sensor hardware directly. It is
//! handed boxed implementations of the capability traits in this module when
//! it is built, so vendor-specific drivers (or the simulation in [`sim`]) are
//! selected at composition time.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sim;
mod wrap;

pub use wrap::WrappedPositionActuator;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by equipment drivers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EqptError {
    #[error("Equipment is not responding: {0}")]
    NotResponding(String),

    #[error("Equipment returned an invalid reading: {0}")]
    InvalidReading(f64),

    #[error("Operation not supported by this equipment: {0}")]
    NotSupported(&'static str),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// An actuator which can be driven at a demanded angular rate.
pub trait VelocityActuator {
    /// Perform any required initialisation.
    fn init(&mut self) -> Result<(), EqptError> {
        Ok(())
    }

    /// Perform any per-cycle work the actuator needs.
    fn periodic(&mut self) -> Result<(), EqptError> {
        Ok(())
    }

    /// Request the output shaft rotate at the desired speed.
    ///
    /// Units: radians/second
    fn set_desired_speed(&mut self, speed_rads: f64) -> Result<(), EqptError>;

    /// Get the current speed of the output shaft. This is not necessarily the
    /// last demanded speed.
    ///
    /// Units: radians/second
    fn get_current_speed(&self) -> Result<f64, EqptError>;
}

/// A sensor measuring the unbounded position of a shaft.
pub trait PositionEncoder {
    /// Get the current position of the shaft.
    ///
    /// The position accumulates over full turns and is not wrapped.
    ///
    /// Units: radians
    fn get_current_position(&self) -> Result<f64, EqptError>;

    /// Redefine the current position of the shaft to be `position_rad`.
    fn set_position(&mut self, position_rad: f64) -> Result<(), EqptError>;
}

/// An actuator which runs its own closed loop to reach a demanded position.
pub trait PositionActuator: PositionEncoder {
    /// Perform any required initialisation.
    fn init(&mut self) -> Result<(), EqptError> {
        Ok(())
    }

    /// Perform any per-cycle work the actuator needs.
    fn periodic(&mut self) -> Result<(), EqptError> {
        Ok(())
    }

    /// Request the shaft turn to the desired (unbounded) position.
    ///
    /// Units: radians
    fn set_desired_position(&mut self, position_rad: f64) -> Result<(), EqptError>;
}

/// An absolute heading reference for the whole vehicle (e.g. an IMU).
pub trait HeadingSensor {
    /// Perform any required initialisation.
    fn init(&mut self) -> Result<(), EqptError> {
        Ok(())
    }

    /// Get the current heading, counter-clockwise positive.
    ///
    /// Units: radians, range [0, 2pi)
    fn get_current_heading(&self) -> Result<f64, EqptError>;

    /// Get the current rate of turn, counter-clockwise positive.
    ///
    /// Units: radians/second
    fn get_current_rate(&self) -> Result<f64, EqptError>;

    /// Re-zero the sensor so that the current heading reads `heading_rad`.
    ///
    /// Sensors which cannot be re-zeroed leave this unimplemented, in which
    /// case the offset is tracked by the odometry instead.
    fn set_reference_heading(&mut self, _heading_rad: f64) -> Result<(), EqptError> {
        Err(EqptError::NotSupported("set_reference_heading"))
    }
}
