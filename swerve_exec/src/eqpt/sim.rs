//! # Simulated equipment
//!
//! A simple rigid-body model of a swerve vehicle, with first order lags on
//! every actuator. The drivers handed out by [`SimChassis::eqpt`] share state
//! with the chassis, so after each control cycle the chassis is stepped and
//! the drivers see the result on the next cycle.
//!
//! The simulation is single threaded and entirely deterministic.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use serde::Deserialize;
use std::cell::RefCell;
use std::rc::Rc;

use super::{EqptError, HeadingSensor, PositionActuator, PositionEncoder, VelocityActuator};
use super::WrappedPositionActuator;
use crate::drive_ctrl::DriveEqpt;
use crate::kinematics::{KinematicsError, ModuleOffset, ModuleState, SwerveKinematics};
use crate::module_ctrl::{ModuleEqpt, SteerEqpt, SteerMode};
use crate::odometry::{robot_to_field, Pose};
use util::maths::norm_angle;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulation.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SimParams {
    /// Time constant of the drive motors' response to a rate demand. Zero
    /// makes the response instantaneous.
    ///
    /// Units: seconds
    pub drive_time_const_s: f64,

    /// Time constant of the steer axes' response to a position demand (or
    /// rate demand, for steer motors).
    ///
    /// Units: seconds
    pub steer_time_const_s: f64,
}

/// A simulated vehicle.
pub struct SimChassis {
    params: SimParams,
    kinematics: SwerveKinematics,
    wheel_radius_m: f64,
    wheels: Vec<Rc<RefCell<SimWheel>>>,
    body: Rc<RefCell<SimBody>>,
}

#[derive(Debug, Default)]
struct SimWheel {
    drive_dem_rads: f64,
    drive_rate_rads: f64,

    /// Position demand from a servo, in the true (un-zeroed) frame. `None`
    /// when the steer is rate driven.
    steer_pos_dem_rad: Option<f64>,
    steer_rate_dem_rads: f64,
    steer_rate_rads: f64,

    /// True unbounded steer position
    steer_pos_rad: f64,

    /// True position at which the steer encoder reads zero
    steer_zero_rad: f64,
}

#[derive(Debug, Default)]
struct SimBody {
    pose: Pose,
    rate_rads: f64,
    gyro_offset_rad: f64,
    gyro_fault: bool,
}

/// Simulated drive motor.
pub struct SimDriveMotor(Rc<RefCell<SimWheel>>);

/// Simulated steer servo, closing its own position loop.
pub struct SimSteerServo(Rc<RefCell<SimWheel>>);

/// Simulated steer motor, driven by rate.
pub struct SimSteerMotor(Rc<RefCell<SimWheel>>);

/// Simulated steer encoder, paired with a [`SimSteerMotor`].
pub struct SimSteerEncoder(Rc<RefCell<SimWheel>>);

/// Simulated heading sensor.
pub struct SimGyro(Rc<RefCell<SimBody>>);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimChassis {
    /// Create a new simulated vehicle at rest at the origin.
    pub fn new(
        params: SimParams,
        offsets: &[ModuleOffset],
        wheel_radius_m: f64,
    ) -> Result<Self, KinematicsError> {
        let kinematics = SwerveKinematics::new(offsets)?;

        Ok(Self {
            params,
            kinematics,
            wheel_radius_m,
            wheels: offsets
                .iter()
                .map(|_| Rc::new(RefCell::new(SimWheel::default())))
                .collect(),
            body: Rc::new(RefCell::new(SimBody::default())),
        })
    }

    /// Create the drivers for this vehicle.
    pub fn eqpt(&self, steer_mode: SteerMode) -> DriveEqpt {
        let modules = self
            .wheels
            .iter()
            .map(|w| ModuleEqpt {
                drive: Box::new(SimDriveMotor(w.clone())),
                steer: match steer_mode {
                    SteerMode::Embedded => SteerEqpt::Embedded(WrappedPositionActuator::new(
                        Box::new(SimSteerServo(w.clone())),
                    )),
                    SteerMode::Looped => SteerEqpt::Looped {
                        motor: Box::new(SimSteerMotor(w.clone())),
                        encoder: Box::new(SimSteerEncoder(w.clone())),
                    },
                },
            })
            .collect();

        DriveEqpt {
            modules,
            heading: Box::new(SimGyro(self.body.clone())),
        }
    }

    /// Advance the simulation by `dt_s` seconds.
    pub fn step(&mut self, dt_s: f64) -> Result<(), KinematicsError> {
        let drive_k = lag_factor(dt_s, self.params.drive_time_const_s);
        let steer_k = lag_factor(dt_s, self.params.steer_time_const_s);

        for w in self.wheels.iter() {
            let w = &mut *w.borrow_mut();

            w.drive_rate_rads += (w.drive_dem_rads - w.drive_rate_rads) * drive_k;

            match w.steer_pos_dem_rad {
                Some(dem) => {
                    let prev = w.steer_pos_rad;
                    w.steer_pos_rad += (dem - prev) * steer_k;
                    w.steer_rate_rads = (w.steer_pos_rad - prev) / dt_s;
                }
                None => {
                    w.steer_rate_rads += (w.steer_rate_dem_rads - w.steer_rate_rads) * steer_k;
                    w.steer_pos_rad += w.steer_rate_rads * dt_s;
                }
            }
        }

        let vel = self.kinematics.forward(&self.true_module_states())?;

        let body = &mut *self.body.borrow_mut();

        // Rotate the translation at the mid-cycle heading
        let mid_heading_rad = body.pose.theta_rad + 0.5 * vel.omega_rads * dt_s;
        let (vx, vy) = robot_to_field(&vel, mid_heading_rad);

        body.pose.x_m += vx * dt_s;
        body.pose.y_m += vy * dt_s;
        body.pose.theta_rad = norm_angle(body.pose.theta_rad + vel.omega_rads * dt_s);
        body.rate_rads = vel.omega_rads;

        trace!("Sim body: {:?}", body.pose);

        Ok(())
    }

    /// The true pose of the vehicle.
    pub fn true_pose(&self) -> Pose {
        self.body.borrow().pose
    }

    /// Teleport the vehicle, without affecting the heading sensor's reading.
    pub fn set_true_pose(&mut self, pose: Pose) {
        let mut body = self.body.borrow_mut();
        let gyro_heading = body.pose.theta_rad + body.gyro_offset_rad;

        body.pose = Pose {
            theta_rad: norm_angle(pose.theta_rad),
            ..pose
        };
        body.gyro_offset_rad = gyro_heading - body.pose.theta_rad;
    }

    /// The true physical state of each module.
    pub fn true_module_states(&self) -> Vec<ModuleState> {
        self.wheels
            .iter()
            .map(|w| {
                let w = w.borrow();
                ModuleState {
                    speed_ms: w.drive_rate_rads * self.wheel_radius_m,
                    heading_rad: norm_angle(w.steer_pos_rad),
                }
            })
            .collect()
    }

    /// Knock the vehicle round by the given angle (e.g. a collision).
    pub fn disturb_heading(&mut self, delta_rad: f64) {
        let mut body = self.body.borrow_mut();
        body.pose.theta_rad = norm_angle(body.pose.theta_rad + delta_rad);
    }

    /// Make the heading sensor stop responding, or recover it.
    pub fn set_gyro_fault(&mut self, fault: bool) {
        self.body.borrow_mut().gyro_fault = fault;
    }
}

impl VelocityActuator for SimDriveMotor {
    fn set_desired_speed(&mut self, speed_rads: f64) -> Result<(), EqptError> {
        if !speed_rads.is_finite() {
            return Err(EqptError::InvalidReading(speed_rads));
        }
        self.0.borrow_mut().drive_dem_rads = speed_rads;
        Ok(())
    }

    fn get_current_speed(&self) -> Result<f64, EqptError> {
        Ok(self.0.borrow().drive_rate_rads)
    }
}

impl PositionEncoder for SimSteerServo {
    fn get_current_position(&self) -> Result<f64, EqptError> {
        let w = self.0.borrow();
        Ok(w.steer_pos_rad - w.steer_zero_rad)
    }

    fn set_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
        let mut w = self.0.borrow_mut();
        w.steer_zero_rad = w.steer_pos_rad - position_rad;
        Ok(())
    }
}

impl PositionActuator for SimSteerServo {
    fn set_desired_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
        if !position_rad.is_finite() {
            return Err(EqptError::InvalidReading(position_rad));
        }
        let mut w = self.0.borrow_mut();
        w.steer_pos_dem_rad = Some(position_rad + w.steer_zero_rad);
        Ok(())
    }
}

impl VelocityActuator for SimSteerMotor {
    fn set_desired_speed(&mut self, speed_rads: f64) -> Result<(), EqptError> {
        if !speed_rads.is_finite() {
            return Err(EqptError::InvalidReading(speed_rads));
        }
        let mut w = self.0.borrow_mut();
        w.steer_pos_dem_rad = None;
        w.steer_rate_dem_rads = speed_rads;
        Ok(())
    }

    fn get_current_speed(&self) -> Result<f64, EqptError> {
        Ok(self.0.borrow().steer_rate_rads)
    }
}

impl PositionEncoder for SimSteerEncoder {
    fn get_current_position(&self) -> Result<f64, EqptError> {
        let w = self.0.borrow();
        Ok(w.steer_pos_rad - w.steer_zero_rad)
    }

    fn set_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
        let mut w = self.0.borrow_mut();
        w.steer_zero_rad = w.steer_pos_rad - position_rad;
        Ok(())
    }
}

impl HeadingSensor for SimGyro {
    fn get_current_heading(&self) -> Result<f64, EqptError> {
        let b = self.0.borrow();
        if b.gyro_fault {
            return Err(EqptError::NotResponding("sim gyro".into()));
        }
        Ok(norm_angle(b.pose.theta_rad + b.gyro_offset_rad))
    }

    fn get_current_rate(&self) -> Result<f64, EqptError> {
        let b = self.0.borrow();
        if b.gyro_fault {
            return Err(EqptError::NotResponding("sim gyro".into()));
        }
        Ok(b.rate_rads)
    }

    fn set_reference_heading(&mut self, heading_rad: f64) -> Result<(), EqptError> {
        let mut b = self.0.borrow_mut();
        if b.gyro_fault {
            return Err(EqptError::NotResponding("sim gyro".into()));
        }
        b.gyro_offset_rad = heading_rad - b.pose.theta_rad;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Fraction of the remaining error closed by a first order lag in one step.
fn lag_factor(dt_s: f64, time_const_s: f64) -> f64 {
    if time_const_s <= 0.0 {
        1.0
    } else {
        1.0 - (-dt_s / time_const_s).exp()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
