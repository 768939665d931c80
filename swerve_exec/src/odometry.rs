//! # Odometry
//!
//! Dead-reckons the vehicle's position from the measured module states. The
//! heading sensor is trusted for orientation, only the position is integrated
//! from wheel motion.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};

use crate::kinematics::{KinematicsError, ModuleState, SwerveKinematics, VehicleVelocity};
use util::maths::norm_angle;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OdometryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Could not compute the vehicle velocity: {0}")]
    KinematicsError(#[from] KinematicsError),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Pose of the vehicle in the field frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Units: meters
    pub x_m: f64,

    /// Units: meters
    pub y_m: f64,

    /// Counter-clockwise from the field +X axis.
    ///
    /// Units: radians, range [0, 2pi)
    pub theta_rad: f64,
}

/// Pose estimator.
#[derive(Debug, Clone)]
pub struct Odometry {
    kinematics: SwerveKinematics,

    pose: Pose,

    /// Added to the sensor heading to give the pose heading.
    heading_offset_rad: f64,

    /// Last sensor reading which was valid.
    last_sensor_heading_rad: Option<f64>,

    heading_stale: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x_m: f64, y_m: f64, theta_rad: f64) -> Self {
        Self {
            x_m,
            y_m,
            theta_rad,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x_m.is_finite() && self.y_m.is_finite() && self.theta_rad.is_finite()
    }
}

impl Odometry {
    /// Create a new estimator starting from `initial_pose`, with the heading
    /// sensor currently reading `sensor_heading_rad`.
    pub fn new(
        kinematics: SwerveKinematics,
        initial_pose: Pose,
        sensor_heading_rad: Option<f64>,
    ) -> Result<Self, OdometryError> {
        let mut odom = Self {
            kinematics,
            pose: Pose::default(),
            heading_offset_rad: 0.0,
            last_sensor_heading_rad: None,
            heading_stale: false,
        };

        odom.reset_pose(initial_pose, sensor_heading_rad)?;

        Ok(odom)
    }

    /// Current pose estimate.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// `true` if the last update had no valid heading reading and the pose
    /// heading is being held at its last valid value.
    pub fn heading_stale(&self) -> bool {
        self.heading_stale
    }

    /// Advance the estimate by `dt_s` seconds.
    ///
    /// A missing or non-finite heading reading is treated as a sensor fault:
    /// the last valid heading is held and [`Odometry::heading_stale`] is set.
    /// Position is still integrated.
    pub fn update(
        &mut self,
        dt_s: f64,
        sensor_heading_rad: Option<f64>,
        states: &[ModuleState],
    ) -> Result<Pose, OdometryError> {
        if !(dt_s > 0.0) || !dt_s.is_finite() {
            return Err(OdometryError::InvalidArgument("dt must be strictly positive"));
        }

        let vel = self.kinematics.forward(states)?;
        if !vel.vx_ms.is_finite() || !vel.vy_ms.is_finite() {
            return Err(OdometryError::InvalidArgument("module states must be finite"));
        }

        match sensor_heading_rad.filter(|h| h.is_finite()) {
            Some(h) => {
                self.pose.theta_rad = norm_angle(h + self.heading_offset_rad);
                self.last_sensor_heading_rad = Some(h);
                self.heading_stale = false;
            }
            None => {
                if !self.heading_stale {
                    warn!("Heading sensor reading invalid, holding last valid heading");
                }
                self.heading_stale = true;
            }
        }

        let (vx_field, vy_field) = robot_to_field(&vel, self.pose.theta_rad);
        self.pose.x_m += vx_field * dt_s;
        self.pose.y_m += vy_field * dt_s;

        Ok(self.pose)
    }

    /// Overwrite the pose estimate.
    ///
    /// `sensor_heading_rad` is the heading sensor reading corresponding to
    /// `pose`, from which the offset between sensor and pose headings is
    /// derived. If it is not known the last valid reading is used instead.
    pub fn reset_pose(
        &mut self,
        pose: Pose,
        sensor_heading_rad: Option<f64>,
    ) -> Result<(), OdometryError> {
        if !pose.is_finite() {
            return Err(OdometryError::InvalidArgument("pose must be finite"));
        }

        let pose = Pose {
            theta_rad: norm_angle(pose.theta_rad),
            ..pose
        };

        let sensor = sensor_heading_rad
            .filter(|h| h.is_finite())
            .or(self.last_sensor_heading_rad);

        // Everything is computed before anything is written so a reset is
        // never half applied.
        let offset_rad = match sensor {
            Some(h) => pose.theta_rad - h,
            None => 0.0,
        };

        self.pose = pose;
        self.heading_offset_rad = offset_rad;
        self.last_sensor_heading_rad = sensor;
        self.heading_stale = sensor.is_none();

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Rotate a robot frame velocity into the field frame given the vehicle's
/// heading.
pub fn robot_to_field(vel: &VehicleVelocity, heading_rad: f64) -> (f64, f64) {
    let (s, c) = heading_rad.sin_cos();
    (
        vel.vx_ms * c - vel.vy_ms * s,
        vel.vx_ms * s + vel.vy_ms * c,
    )
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::kinematics::ModuleOffset;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn kin() -> SwerveKinematics {
        SwerveKinematics::new(&[
            ModuleOffset::new(0.3, 0.3),
            ModuleOffset::new(0.3, -0.3),
            ModuleOffset::new(-0.3, 0.3),
            ModuleOffset::new(-0.3, -0.3),
        ])
        .unwrap()
    }

    #[test]
    fn test_stationary() {
        let mut odom = Odometry::new(kin(), Pose::new(1.0, -2.0, 0.5), Some(0.5)).unwrap();
        let states = [ModuleState::new(0.0, 1.0); 4];

        for _ in 0..500 {
            odom.update(0.02, Some(0.5), &states).unwrap();
        }

        assert_eq!(odom.pose(), Pose::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn test_integrates_in_field_frame() {
        let mut odom = Odometry::new(kin(), Pose::default(), Some(0.0)).unwrap();

        // Robot faces field +Y and drives forward at 1 m/s for 1 s
        let states = [ModuleState::new(1.0, 0.0); 4];
        for _ in 0..50 {
            odom.update(0.02, Some(FRAC_PI_2), &states).unwrap();
        }

        let p = odom.pose();
        assert!(p.x_m.abs() < 1e-9);
        assert!((p.y_m - 1.0).abs() < 1e-9);
        assert!((p.theta_rad - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_reset_pose() {
        let mut odom = Odometry::new(kin(), Pose::default(), Some(0.0)).unwrap();
        let states = [ModuleState::new(1.0, 0.0); 4];
        odom.update(0.5, Some(0.0), &states).unwrap();

        odom.reset_pose(Pose::new(2.0, 3.0, FRAC_PI_4), Some(0.0)).unwrap();
        assert_eq!(odom.pose(), Pose::new(2.0, 3.0, FRAC_PI_4));

        // Integration continues from the reset pose, with the sensor reading 0
        // now meaning pi/4
        odom.update(0.1, Some(0.0), &states).unwrap();
        let p = odom.pose();
        assert!((p.x_m - (2.0 + 0.1 * FRAC_PI_4.cos())).abs() < 1e-9);
        assert!((p.y_m - (3.0 + 0.1 * FRAC_PI_4.sin())).abs() < 1e-9);
        assert!((p.theta_rad - FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn test_heading_fault_holds_last_valid() {
        let mut odom = Odometry::new(kin(), Pose::default(), Some(0.0)).unwrap();
        let states = [ModuleState::new(1.0, 0.0); 4];

        odom.update(0.02, Some(0.3), &states).unwrap();
        assert!(!odom.heading_stale());

        let p = odom.update(0.02, Some(f64::NAN), &states).unwrap();
        assert!(odom.heading_stale());
        assert!(p.is_finite());
        assert!((p.theta_rad - 0.3).abs() < 1e-12);

        let p = odom.update(0.02, None, &states).unwrap();
        assert!(odom.heading_stale());
        assert!((p.theta_rad - 0.3).abs() < 1e-12);

        odom.update(0.02, Some(0.4), &states).unwrap();
        assert!(!odom.heading_stale());
    }

    #[test]
    fn test_invalid_update() {
        let mut odom = Odometry::new(kin(), Pose::default(), Some(0.0)).unwrap();
        let states = [ModuleState::default(); 4];

        assert!(matches!(
            odom.update(0.0, Some(0.0), &states),
            Err(OdometryError::InvalidArgument(_))
        ));
        assert!(matches!(
            odom.update(0.02, Some(0.0), &states[..3]),
            Err(OdometryError::KinematicsError(_))
        ));

        let bad = [ModuleState::new(f64::NAN, 0.0); 4];
        assert!(odom.update(0.02, Some(0.0), &bad).is_err());
        assert_eq!(odom.pose(), Pose::default());
    }
}
