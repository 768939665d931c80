//! Continuous angle adapter for position actuators

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::TAU;

use util::maths::{norm_angle, wrap_dist};

use super::{EqptError, PositionActuator};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Wraps an unbounded [`PositionActuator`] so that it can be commanded with a
/// heading in [0, 2pi).
///
/// A heading demand is converted into the equivalent unbounded position
/// closest to the actuator's current position, so the shaft never rotates
/// more than half a turn to reach a new heading.
pub struct WrappedPositionActuator {
    inner: Box<dyn PositionActuator>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WrappedPositionActuator {
    pub fn new(inner: Box<dyn PositionActuator>) -> Self {
        Self { inner }
    }

    pub fn init(&mut self) -> Result<(), EqptError> {
        self.inner.init()
    }

    pub fn periodic(&mut self) -> Result<(), EqptError> {
        self.inner.periodic()
    }

    /// Request the shaft face the given heading, taking the shortest path.
    ///
    /// Returns the unbounded position which was demanded.
    pub fn set_desired_heading(&mut self, heading_rad: f64) -> Result<f64, EqptError> {
        let current_rad = self.inner.get_current_position()?;
        let target_rad = nearest_position(current_rad, heading_rad);

        self.inner.set_desired_position(target_rad)?;

        Ok(target_rad)
    }

    /// Get the heading the shaft is currently facing, in [0, 2pi).
    pub fn get_current_heading(&self) -> Result<f64, EqptError> {
        self.inner.get_current_position().map(norm_angle)
    }

    /// Get the raw unbounded position of the shaft.
    pub fn get_current_position(&self) -> Result<f64, EqptError> {
        self.inner.get_current_position()
    }

    /// Redefine the current position of the shaft.
    pub fn set_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
        self.inner.set_position(position_rad)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the unbounded position equivalent to `heading_rad` which is closest to
/// `current_rad`.
pub(crate) fn nearest_position(current_rad: f64, heading_rad: f64) -> f64 {
    current_rad + wrap_dist(norm_angle(current_rad), norm_angle(heading_rad), TAU)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::eqpt::PositionEncoder;
    use std::cell::RefCell;
    use std::f64::consts::PI;
    use std::rc::Rc;

    struct Servo {
        pos: Rc<RefCell<f64>>,
    }

    impl PositionEncoder for Servo {
        fn get_current_position(&self) -> Result<f64, EqptError> {
            Ok(*self.pos.borrow())
        }

        fn set_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
            *self.pos.borrow_mut() = position_rad;
            Ok(())
        }
    }

    impl PositionActuator for Servo {
        fn set_desired_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
            *self.pos.borrow_mut() = position_rad;
            Ok(())
        }
    }

    #[test]
    fn test_nearest_position() {
        // Several turns in, the target should stay on the same turn
        let current = 4.0 * PI + 0.1;
        assert!((nearest_position(current, 0.3) - (4.0 * PI + 0.3)).abs() < 1e-12);

        // Crossing zero goes backwards rather than most of a turn forwards
        assert!((nearest_position(0.1, TAU - 0.1) - (-0.1)).abs() < 1e-12);

        // Negative unbounded positions
        assert!((nearest_position(-TAU - 0.1, 0.1) - (-TAU + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_wrapped_actuator() {
        let pos = Rc::new(RefCell::new(-3.0 * TAU));
        let mut act = WrappedPositionActuator::new(Box::new(Servo { pos: pos.clone() }));

        let dem = act.set_desired_heading(1.5 * PI).unwrap();
        assert!((dem - (-3.0 * TAU - 0.5 * PI)).abs() < 1e-9);
        assert!((act.get_current_heading().unwrap() - 1.5 * PI).abs() < 1e-9);
    }
}
