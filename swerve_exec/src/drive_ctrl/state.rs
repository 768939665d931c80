//! Implementations for the DriveCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::convert::TryFrom;

// Internal
use super::{
    field_to_robot, DriveCmd, DriveCtrlError, DriveEqpt, HeadingHold, HoldState, Params,
    MIN_MODULE_SPEED_MS, NUM_MODULES,
};
use crate::eqpt::{EqptError, HeadingSensor};
use crate::kinematics::{ModuleState, SwerveKinematics, VehicleVelocity};
use crate::module_ctrl::{ModuleCtrl, ModuleDems, ModuleId};
use crate::odometry::{Odometry, Pose};
use util::{maths::limit_mag, module::State};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drivetrain control module state
pub struct DriveCtrl {
    params: Params,

    kinematics: SwerveKinematics,

    /// Indexed by [`ModuleId::index`]
    modules: [ModuleCtrl; NUM_MODULES],

    heading_sensor: Box<dyn HeadingSensor>,

    odometry: Odometry,

    heading_hold: HeadingHold,

    /// Latest robot frame command, after limiting
    cmd: VehicleVelocity,

    /// Whether the latest command had its translation or turn rate limited
    cmd_limited: (bool, bool),

    stopped: bool,

    /// Last successfully read state of each module
    measured: [ModuleState; NUM_MODULES],
}

/// Input data to DriveCtrl.
#[derive(Debug, Clone, Copy)]
pub struct InputData {
    /// Time since the previous cycle
    ///
    /// Units: seconds
    pub dt_s: f64,
}

/// Snapshot of the drivetrain published at the end of each cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DriveTm {
    /// Estimated pose
    pub pose: Pose,

    /// Robot frame velocity in force, with the turn rate actually used this
    /// cycle (which may come from heading hold)
    pub vel_dem: VehicleVelocity,

    /// Measured state of each module
    pub measured: [ModuleState; NUM_MODULES],

    /// Demands sent to each module
    pub dems: [ModuleDems; NUM_MODULES],

    pub hold_state: HoldState,

    /// Units: radians
    pub heading_goal_rad: Option<f64>,

    pub heading_goal_reached: bool,

    pub stopped: bool,
}

/// Status report for DriveCtrl processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// Commanded translation exceeded the maximum linear speed
    pub linear_limited: bool,

    /// Commanded turn rate exceeded the maximum angular speed
    pub angular_limited: bool,

    /// Module speeds were scaled down to stay within the module limit
    pub module_speed_limited: bool,

    /// Heading sensor unavailable, the last valid heading is being held
    pub heading_stale: bool,

    pub heading_hold_active: bool,

    /// A module's equipment could not be read or commanded
    pub module_faults: [bool; NUM_MODULES],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrl {
    /// Build the drivetrain from its parameters and equipment.
    ///
    /// Nothing is sent to the equipment until [`State::init`] is called.
    pub fn new(params: Params, eqpt: DriveEqpt) -> Result<Self, DriveCtrlError> {
        params.validate()?;

        if eqpt.modules.len() != NUM_MODULES {
            return Err(DriveCtrlError::InvalidArgument(format!(
                "Expected equipment for {} modules, found {}",
                NUM_MODULES,
                eqpt.modules.len()
            )));
        }

        if let Some(m) = eqpt
            .modules
            .iter()
            .find(|m| m.steer.mode() != params.steer_mode)
        {
            return Err(DriveCtrlError::InvalidArgument(format!(
                "Steer mode is {:?} but equipment is {:?}",
                params.steer_mode,
                m.steer.mode()
            )));
        }

        let kinematics = SwerveKinematics::new(&params.module_offsets_m)?;

        let modules = ModuleId::ALL
            .iter()
            .zip(eqpt.modules.into_iter())
            .map(|(id, m)| ModuleCtrl::new(*id, params.wheel_radius_m, params.steer_pid, m))
            .collect::<Result<Vec<_>, _>>()?;
        let modules = <[ModuleCtrl; NUM_MODULES]>::try_from(modules).map_err(|v| {
            DriveCtrlError::InvalidArgument(format!(
                "Expected {} modules, found {}",
                NUM_MODULES,
                v.len()
            ))
        })?;

        let odometry = Odometry::new(kinematics.clone(), Pose::default(), None)?;

        let heading_hold = HeadingHold::new(
            params.heading_pid,
            params.heading_max_rate_rads,
            params.heading_max_accel_radss,
            params.heading_tolerance_rad,
        )?;

        Ok(Self {
            params,
            kinematics,
            modules,
            heading_sensor: eqpt.heading,
            odometry,
            heading_hold,
            cmd: VehicleVelocity::default(),
            cmd_limited: (false, false),
            stopped: true,
            measured: [ModuleState::default(); NUM_MODULES],
        })
    }

    /// Command a velocity in the robot frame.
    ///
    /// The translation is scaled down (keeping its direction) to the maximum
    /// linear speed, and the turn rate clamped to the maximum angular speed. A
    /// turn rate of exactly zero engages heading hold.
    pub fn drive_robot_frame(
        &mut self,
        vx_ms: f64,
        vy_ms: f64,
        omega_rads: f64,
    ) -> Result<(), DriveCtrlError> {
        if !vx_ms.is_finite() || !vy_ms.is_finite() || !omega_rads.is_finite() {
            return Err(DriveCtrlError::InvalidArgument(format!(
                "Non-finite velocity command ({}, {}, {})",
                vx_ms, vy_ms, omega_rads
            )));
        }

        let (vx_ms, vy_ms, linear_limited) =
            limit_mag(vx_ms, vy_ms, self.params.max_linear_speed_ms);

        let max_w = self.params.max_angular_speed_rads;
        let omega_limited = omega_rads.clamp(-max_w, max_w);
        let angular_limited = omega_limited != omega_rads;

        if linear_limited || angular_limited {
            warn!(
                "Velocity command limited to ({:.3}, {:.3}, {:.3})",
                vx_ms, vy_ms, omega_limited
            );
        }

        self.cmd = VehicleVelocity {
            vx_ms,
            vy_ms,
            omega_rads: omega_limited,
        };
        self.cmd_limited = (linear_limited, angular_limited);
        self.stopped = false;

        Ok(())
    }

    /// Command a velocity in the field frame.
    ///
    /// The translation is rotated into the robot frame using the current
    /// heading estimate.
    pub fn drive_field_frame(
        &mut self,
        vx_ms: f64,
        vy_ms: f64,
        omega_rads: f64,
    ) -> Result<(), DriveCtrlError> {
        let robot = field_to_robot(
            &VehicleVelocity::new(vx_ms, vy_ms, omega_rads),
            self.odometry.pose().theta_rad,
        );

        trace!("Field command rotated into robot frame: {:?}", robot);

        self.drive_robot_frame(robot.vx_ms, robot.vy_ms, robot.omega_rads)
    }

    /// Set the heading to hold whenever no turn rate is commanded.
    ///
    /// With `reset_profile` the heading profile restarts from the current
    /// heading and turn rate.
    pub fn set_heading_goal(
        &mut self,
        heading_rad: f64,
        reset_profile: bool,
    ) -> Result<(), DriveCtrlError> {
        if !heading_rad.is_finite() {
            return Err(DriveCtrlError::InvalidArgument(format!(
                "Non-finite heading goal {}",
                heading_rad
            )));
        }

        debug!("Heading goal set to {:.3} rad", heading_rad);

        let rate_rads = self.heading_sensor.get_current_rate().unwrap_or(0.0);
        self.heading_hold.set_goal(
            heading_rad,
            self.odometry.pose().theta_rad,
            rate_rads,
            reset_profile,
        );

        Ok(())
    }

    /// Stop the vehicle.
    ///
    /// All drive speeds go to zero with the wheels left at their current
    /// headings, and heading hold is released.
    pub fn stop(&mut self) {
        if !self.stopped {
            info!("DriveCtrl stopping");
        }

        self.cmd = VehicleVelocity::default();
        self.cmd_limited = (false, false);
        self.stopped = true;
        self.heading_hold.release();
    }

    /// Overwrite the pose estimate.
    ///
    /// The heading sensor is re-referenced so it reads the new heading, and
    /// the heading hold is re-seeded so the jump is not seen as an error.
    pub fn reset_pose(&mut self, pose: Pose) -> Result<(), DriveCtrlError> {
        if !pose.is_finite() {
            return Err(DriveCtrlError::InvalidArgument(format!(
                "Non-finite pose {:?}",
                pose
            )));
        }

        let sensor_heading_rad = match self.heading_sensor.set_reference_heading(pose.theta_rad) {
            Ok(()) => Some(pose.theta_rad),
            Err(EqptError::NotSupported(_)) => {
                debug!("Heading sensor cannot be re-referenced, offsetting in odometry");
                self.heading_sensor.get_current_heading().ok()
            }
            Err(e) => {
                warn!("Could not re-reference the heading sensor: {}", e);
                self.heading_sensor.get_current_heading().ok()
            }
        };

        self.odometry.reset_pose(pose, sensor_heading_rad)?;

        let rate_rads = self.heading_sensor.get_current_rate().unwrap_or(0.0);
        self.heading_hold
            .rebase(self.odometry.pose().theta_rad, rate_rads);

        info!("Pose reset to {:?}", self.odometry.pose());

        Ok(())
    }

    /// The pose estimate as of the end of the last cycle.
    pub fn get_current_pose(&self) -> Pose {
        self.odometry.pose()
    }

    /// `true` if heading hold is active and has reached its goal.
    pub fn heading_goal_reached(&self) -> bool {
        self.heading_hold
            .goal_reached(self.odometry.pose().theta_rad)
    }

    /// The vehicle velocity implied by the last measured module states.
    pub fn current_speeds(&self) -> Result<VehicleVelocity, DriveCtrlError> {
        Ok(self.kinematics.forward(&self.measured)?)
    }

    /// The robot frame velocity currently commanded, after limiting.
    pub fn commanded_velocity(&self) -> VehicleVelocity {
        self.cmd
    }

    pub fn hold_state(&self) -> HoldState {
        self.heading_hold.state()
    }

    pub fn module(&self, id: ModuleId) -> &ModuleCtrl {
        &self.modules[id.index()]
    }

    /// Re-zero every module's steer encoder at the current wheel headings.
    pub fn reset_zero(&mut self) -> Result<(), DriveCtrlError> {
        for m in self.modules.iter_mut() {
            m.reset_zero()?;
        }

        info!("All module steer encoders re-zeroed");

        Ok(())
    }

    /// Execute a drive command.
    pub fn exec_cmd(&mut self, cmd: &DriveCmd) -> Result<(), DriveCtrlError> {
        if !cmd.is_valid() {
            return Err(DriveCtrlError::InvalidArgument(format!(
                "Invalid drive command: {:?}",
                cmd
            )));
        }

        debug!("Executing {:?}", cmd);

        match *cmd {
            DriveCmd::Robot {
                vx_ms,
                vy_ms,
                omega_rads,
            } => self.drive_robot_frame(vx_ms, vy_ms, omega_rads),
            DriveCmd::Field {
                vx_ms,
                vy_ms,
                omega_rads,
            } => self.drive_field_frame(vx_ms, vy_ms, omega_rads),
            DriveCmd::Heading { heading_rad } => {
                self.set_heading_goal(heading_rad, true)?;
                self.drive_robot_frame(self.cmd.vx_ms, self.cmd.vy_ms, 0.0)
            }
            DriveCmd::Stop => {
                self.stop();
                Ok(())
            }
        }
    }
}

impl State for DriveCtrl {
    type InitData = Pose;
    type InitError = DriveCtrlError;

    type InputData = InputData;
    type OutputData = DriveTm;
    type StatusReport = StatusReport;
    type ProcError = DriveCtrlError;

    /// Initialise the equipment and set the starting pose.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        self.heading_sensor.init()?;

        for (i, m) in self.modules.iter_mut().enumerate() {
            m.init()?;
            self.measured[i] = m.get_current_state()?;
        }

        self.reset_pose(init_data)?;
        self.stop();

        info!("DriveCtrl initialised");

        Ok(())
    }

    /// Perform one control cycle.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let dt_s = input_data.dt_s;
        if !(dt_s > 0.0) || !dt_s.is_finite() {
            return Err(DriveCtrlError::InvalidArgument(format!(
                "Cycle time must be positive, found {}",
                dt_s
            )));
        }

        let mut report = StatusReport {
            linear_limited: self.cmd_limited.0,
            angular_limited: self.cmd_limited.1,
            ..Default::default()
        };

        // ---- SENSING ----

        for (i, m) in self.modules.iter().enumerate() {
            match m.get_current_state() {
                Ok(s) => self.measured[i] = s,
                Err(e) => {
                    warn!("Could not read module {}, using last state: {}", m.id(), e);
                    report.module_faults[i] = true;
                }
            }
        }

        let heading_rad = match self.heading_sensor.get_current_heading() {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("Could not read the heading sensor: {}", e);
                None
            }
        };
        let rate_rads = self.heading_sensor.get_current_rate().unwrap_or(0.0);

        // ---- ODOMETRY ----

        if let Err(e) = self.odometry.update(dt_s, heading_rad, &self.measured) {
            warn!("Odometry not updated this cycle: {}", e);
        }
        report.heading_stale = self.odometry.heading_stale();

        let pose = self.odometry.pose();

        // ---- COMMAND ----

        let (vel_dem, dems) = if self.stopped {
            let dems: Vec<ModuleState> = self
                .modules
                .iter()
                .map(|m| ModuleState::new(0.0, m.last_commanded_heading()))
                .collect();
            (VehicleVelocity::default(), dems)
        } else {
            let max_w = self.params.max_angular_speed_rads;
            let omega_rads = self
                .heading_hold
                .update(pose.theta_rad, rate_rads, self.cmd.omega_rads, dt_s)?
                .clamp(-max_w, max_w);

            let vel_dem = VehicleVelocity {
                omega_rads,
                ..self.cmd
            };

            let mut dems = self.kinematics.inverse(&vel_dem);
            report.module_speed_limited =
                desaturate(&mut dems, self.params.max_module_speed_ms);

            for (d, m) in dems.iter_mut().zip(self.modules.iter()) {
                if d.speed_ms.abs() < MIN_MODULE_SPEED_MS {
                    *d = ModuleState::new(0.0, m.last_commanded_heading());
                }
            }

            (vel_dem, dems)
        };
        report.heading_hold_active = self.heading_hold.state() == HoldState::Holding;

        // ---- DISPATCH ----

        for (i, (m, d)) in self.modules.iter_mut().zip(dems.iter()).enumerate() {
            if let Err(e) = m.set_desired_state(d.speed_ms, d.heading_rad) {
                warn!("Could not command module {}: {}", m.id(), e);
                report.module_faults[i] = true;
            }

            if let Err(e) = m.periodic(dt_s) {
                warn!("Module {} periodic processing failed: {}", m.id(), e);
                report.module_faults[i] = true;
            }
        }

        // ---- TELEMETRY ----

        let mut module_dems = [ModuleDems::default(); NUM_MODULES];
        for (d, m) in module_dems.iter_mut().zip(self.modules.iter()) {
            *d = m.dems();
        }

        let tm = DriveTm {
            pose,
            vel_dem,
            measured: self.measured,
            dems: module_dems,
            hold_state: self.heading_hold.state(),
            heading_goal_rad: self.heading_hold.goal(),
            heading_goal_reached: self.heading_goal_reached(),
            stopped: self.stopped,
        };

        trace!("DriveCtrl tm: {:?}", tm);

        Ok((tm, report))
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale all module speeds down together so none exceeds `max_speed_ms`.
///
/// Returns `true` if any scaling was applied.
fn desaturate(states: &mut [ModuleState], max_speed_ms: f64) -> bool {
    let fastest_ms = states
        .iter()
        .map(|s| s.speed_ms.abs())
        .fold(0.0, f64::max);

    if fastest_ms <= max_speed_ms {
        return false;
    }

    let scale = max_speed_ms / fastest_ms;
    for s in states.iter_mut() {
        s.speed_ms *= scale;
    }

    warn!(
        "Module speeds saturated ({:.3} m/s), scaled by {:.3}",
        fastest_ms, scale
    );

    true
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
