//! Implementations for the ModuleCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use serde::Serialize;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

// Internal
use super::{
    FlipDeltaMode, ModuleCtrlError, ModuleEqpt, ModuleId, SteerEqpt, SteerMode, FLIP_DELTA_MODE,
};
use crate::eqpt::VelocityActuator;
use crate::kinematics::ModuleState;
use crate::pid::{ContinuousPid, PidParams};
use util::maths::{norm_angle, wrap_dist};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Controller for a single swerve module.
pub struct ModuleCtrl {
    id: ModuleId,

    /// Units: meters
    wheel_radius_m: f64,

    drive: Box<dyn VelocityActuator>,
    steer: SteerEqpt,

    /// Steer position loop, only present in [`SteerMode::Looped`].
    steer_pid: Option<ContinuousPid>,

    /// Last heading passed to `set_desired_state`, before any flip.
    last_commanded_heading_rad: f64,

    flip_flag: bool,

    dems: ModuleDems,
}

/// The demands most recently sent to a module's actuators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModuleDems {
    /// Units: radians/second
    pub drive_rate_rads: f64,

    /// Units: radians, range [0, 2pi)
    pub steer_heading_rad: f64,

    /// Whether the flip optimisation was applied to the demand
    pub flipped: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleCtrl {
    /// Create a new module controller.
    ///
    /// `steer_pid_params` are only used if the steer equipment is
    /// [`SteerEqpt::Looped`], in which case the wrap period is forced to 2pi.
    pub fn new(
        id: ModuleId,
        wheel_radius_m: f64,
        steer_pid_params: PidParams,
        eqpt: ModuleEqpt,
    ) -> Result<Self, ModuleCtrlError> {
        if !(wheel_radius_m > 0.0) || !wheel_radius_m.is_finite() {
            return Err(ModuleCtrlError::InvalidArgument(
                "wheel radius must be positive",
            ));
        }

        let steer_pid = match eqpt.steer.mode() {
            SteerMode::Looped => Some(ContinuousPid::new(
                steer_pid_params.with_wrap_period(TAU),
            )?),
            SteerMode::Embedded => None,
        };

        Ok(Self {
            id,
            wheel_radius_m,
            drive: eqpt.drive,
            steer: eqpt.steer,
            steer_pid,
            last_commanded_heading_rad: 0.0,
            flip_flag: false,
            dems: ModuleDems::default(),
        })
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn steer_mode(&self) -> SteerMode {
        self.steer.mode()
    }

    pub fn flip_flag(&self) -> bool {
        self.flip_flag
    }

    /// The last heading demanded of this module, before the flip optimisation.
    pub fn last_commanded_heading(&self) -> f64 {
        self.last_commanded_heading_rad
    }

    pub fn dems(&self) -> ModuleDems {
        self.dems
    }

    /// Initialise the module's equipment.
    ///
    /// The module starts out holding whatever heading the wheel is currently
    /// facing.
    pub fn init(&mut self) -> Result<(), ModuleCtrlError> {
        self.drive.init()?;

        match self.steer {
            SteerEqpt::Embedded(ref mut act) => act.init()?,
            SteerEqpt::Looped { ref mut motor, .. } => motor.init()?,
        }

        let heading_rad = self.current_heading()?;

        self.last_commanded_heading_rad = heading_rad;
        self.flip_flag = false;
        self.dems = ModuleDems {
            drive_rate_rads: 0.0,
            steer_heading_rad: heading_rad,
            flipped: false,
        };
        if let Some(ref mut pid) = self.steer_pid {
            pid.reset(heading_rad);
        }

        debug!("Module {} initialised at heading {:.3} rad", self.id, heading_rad);

        Ok(())
    }

    /// Demand a wheel speed and heading from the module.
    ///
    /// Units: meters/second, radians
    pub fn set_desired_state(
        &mut self,
        speed_ms: f64,
        heading_rad: f64,
    ) -> Result<(), ModuleCtrlError> {
        if !speed_ms.is_finite() || !heading_rad.is_finite() {
            return Err(ModuleCtrlError::InvalidArgument(
                "desired speed and heading must be finite",
            ));
        }

        let heading_rad = norm_angle(heading_rad);

        let delta_rad =
            heading_delta(FLIP_DELTA_MODE, self.last_commanded_heading_rad, heading_rad);
        if flip_band_contains(delta_rad) {
            self.flip_flag = !self.flip_flag;
        }
        self.last_commanded_heading_rad = heading_rad;

        let (speed_ms, steer_heading_rad) = if self.flip_flag {
            (-speed_ms, norm_angle(heading_rad + PI))
        } else {
            (speed_ms, heading_rad)
        };

        self.dems = ModuleDems {
            drive_rate_rads: speed_ms / self.wheel_radius_m,
            steer_heading_rad,
            flipped: self.flip_flag,
        };

        trace!("Module {} dems: {:?}", self.id, self.dems);

        self.drive.set_desired_speed(self.dems.drive_rate_rads)?;

        // In looped mode the steer demand is acted on in `periodic`
        if let SteerEqpt::Embedded(ref mut act) = self.steer {
            act.set_desired_heading(steer_heading_rad)?;
        }

        Ok(())
    }

    /// Get the measured physical state of the wheel.
    ///
    /// This is the true signed ground speed and the heading the wheel is
    /// actually facing, regardless of the flip flag.
    pub fn get_current_state(&self) -> Result<ModuleState, ModuleCtrlError> {
        let speed_ms = self.drive.get_current_speed()? * self.wheel_radius_m;
        let heading_rad = self.current_heading()?;

        Ok(ModuleState {
            speed_ms,
            heading_rad,
        })
    }

    /// Per-cycle processing, run after the demands for this cycle are set.
    pub fn periodic(&mut self, dt_s: f64) -> Result<(), ModuleCtrlError> {
        self.drive.periodic()?;

        match self.steer {
            SteerEqpt::Embedded(ref mut act) => act.periodic()?,
            SteerEqpt::Looped {
                ref mut motor,
                ref encoder,
            } => {
                let heading_rad = match encoder.get_current_position() {
                    Ok(p) => norm_angle(p),
                    Err(e) => {
                        // Without feedback the steer must not keep turning
                        if let Err(stop_err) = motor.set_desired_speed(0.0) {
                            warn!(
                                "Module {} could not stop its steer motor: {}",
                                self.id, stop_err
                            );
                        }
                        if let Some(ref mut pid) = self.steer_pid {
                            pid.reset(self.dems.steer_heading_rad);
                        }
                        return Err(e.into());
                    }
                };

                let rate_rads = match self.steer_pid {
                    Some(ref mut pid) => {
                        pid.compute(heading_rad, self.dems.steer_heading_rad, dt_s)?
                    }
                    None => 0.0,
                };

                motor.set_desired_speed(rate_rads)?;
                motor.periodic()?;
            }
        }

        Ok(())
    }

    /// Re-zero the steer encoder so that the wheel's current heading reads 0.
    ///
    /// The steer position jumps, so the module forgets its last commanded
    /// heading and the steer loop is re-seeded.
    pub fn reset_zero(&mut self) -> Result<(), ModuleCtrlError> {
        match self.steer {
            SteerEqpt::Embedded(ref mut act) => {
                act.set_position(0.0)?;
                act.set_desired_heading(0.0)?;
            }
            SteerEqpt::Looped {
                ref mut encoder, ..
            } => encoder.set_position(0.0)?,
        }

        if let Some(ref mut pid) = self.steer_pid {
            pid.reset(0.0);
        }

        self.last_commanded_heading_rad = 0.0;
        self.flip_flag = false;
        self.dems.steer_heading_rad = 0.0;
        self.dems.flipped = false;

        debug!("Module {} steer re-zeroed", self.id);

        Ok(())
    }

    fn current_heading(&self) -> Result<f64, ModuleCtrlError> {
        let heading_rad = match self.steer {
            SteerEqpt::Embedded(ref act) => act.get_current_heading()?,
            SteerEqpt::Looped { ref encoder, .. } => {
                norm_angle(encoder.get_current_position()?)
            }
        };

        Ok(heading_rad)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Heading change between two normalised demands, as measured by `mode`.
fn heading_delta(mode: FlipDeltaMode, last_rad: f64, new_rad: f64) -> f64 {
    match mode {
        FlipDeltaMode::Absolute => (new_rad - last_rad).abs(),
        FlipDeltaMode::Shortest => wrap_dist(last_rad, new_rad, TAU).abs(),
    }
}

/// The flip flag is toggled only for deltas strictly between a quarter and
/// three quarters of a turn.
fn flip_band_contains(delta_rad: f64) -> bool {
    delta_rad > FRAC_PI_2 && delta_rad < 3.0 * FRAC_PI_2
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::eqpt::{
        EqptError, PositionActuator, PositionEncoder, WrappedPositionActuator,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Rig {
        drive_rate: Rc<RefCell<f64>>,
        steer_pos: Rc<RefCell<f64>>,
        steer_rate: Rc<RefCell<f64>>,
    }

    struct Motor(Rc<RefCell<f64>>);
    struct Servo(Rc<RefCell<f64>>);

    /// Encoder which stops responding once `faulted` is set.
    struct FlakyEncoder {
        pos: Rc<RefCell<f64>>,
        faulted: Rc<RefCell<bool>>,
    }

    impl PositionEncoder for FlakyEncoder {
        fn get_current_position(&self) -> Result<f64, EqptError> {
            if *self.faulted.borrow() {
                Err(EqptError::NotResponding("steer encoder".into()))
            } else {
                Ok(*self.pos.borrow())
            }
        }

        fn set_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
            *self.pos.borrow_mut() = position_rad;
            Ok(())
        }
    }

    impl VelocityActuator for Motor {
        fn set_desired_speed(&mut self, speed_rads: f64) -> Result<(), EqptError> {
            *self.0.borrow_mut() = speed_rads;
            Ok(())
        }

        fn get_current_speed(&self) -> Result<f64, EqptError> {
            Ok(*self.0.borrow())
        }
    }

    impl PositionEncoder for Servo {
        fn get_current_position(&self) -> Result<f64, EqptError> {
            Ok(*self.0.borrow())
        }

        fn set_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
            *self.0.borrow_mut() = position_rad;
            Ok(())
        }
    }

    impl PositionActuator for Servo {
        fn set_desired_position(&mut self, position_rad: f64) -> Result<(), EqptError> {
            *self.0.borrow_mut() = position_rad;
            Ok(())
        }
    }

    fn embedded(rig: &Rig) -> ModuleCtrl {
        ModuleCtrl::new(
            ModuleId::FrontLeft,
            0.5,
            PidParams::new(1.0, 0.0, 0.0, 10.0, 0.0),
            ModuleEqpt {
                drive: Box::new(Motor(rig.drive_rate.clone())),
                steer: SteerEqpt::Embedded(WrappedPositionActuator::new(Box::new(Servo(
                    rig.steer_pos.clone(),
                )))),
            },
        )
        .unwrap()
    }

    fn looped(rig: &Rig) -> ModuleCtrl {
        ModuleCtrl::new(
            ModuleId::RearRight,
            0.5,
            PidParams::new(2.0, 0.0, 0.0, 10.0, 0.0),
            ModuleEqpt {
                drive: Box::new(Motor(rig.drive_rate.clone())),
                steer: SteerEqpt::Looped {
                    motor: Box::new(Motor(rig.steer_rate.clone())),
                    encoder: Box::new(Servo(rig.steer_pos.clone())),
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn test_no_flip_for_small_changes() {
        let rig = Rig::default();
        let mut m = embedded(&rig);

        m.set_desired_state(1.0, 0.5).unwrap();
        assert!(!m.flip_flag());
        assert!((*rig.drive_rate.borrow() - 2.0).abs() < 1e-12);
        assert!((*rig.steer_pos.borrow() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_flip_at_half_turn() {
        let rig = Rig::default();
        let mut m = embedded(&rig);

        // From 0 to pi the delta is pi, inside the band
        m.set_desired_state(1.0, PI).unwrap();
        assert!(m.flip_flag());
        assert!((m.last_commanded_heading() - PI).abs() < 1e-12);

        // Reversed drive, steer stays facing 0
        assert!((*rig.drive_rate.borrow() + 2.0).abs() < 1e-12);
        assert!(rig.steer_pos.borrow().abs() < 1e-12);
        assert!(m.dems().flipped);
    }

    #[test]
    fn test_flip_band_boundaries() {
        assert!(!flip_band_contains(FRAC_PI_2));
        assert!(!flip_band_contains(3.0 * FRAC_PI_2));
        assert!(flip_band_contains(FRAC_PI_2 + 1e-9));
        assert!(flip_band_contains(3.0 * FRAC_PI_2 - 1e-9));
        assert!(flip_band_contains(PI));

        let rig = Rig::default();
        let mut m = embedded(&rig);
        m.set_desired_state(1.0, FRAC_PI_2).unwrap();
        assert!(!m.flip_flag());
        m.set_desired_state(1.0, 0.0).unwrap();
        assert!(!m.flip_flag());
        m.set_desired_state(1.0, 3.0 * FRAC_PI_2).unwrap();
        assert!(!m.flip_flag());
    }

    #[test]
    fn test_flip_uses_absolute_difference() {
        assert_eq!(FLIP_DELTA_MODE, FlipDeltaMode::Absolute);

        // 0.1 -> 2pi - 0.1 is a tiny real change but a near full turn of raw
        // difference, so no toggle
        let rig = Rig::default();
        let mut m = embedded(&rig);
        m.set_desired_state(1.0, 0.1).unwrap();
        m.set_desired_state(1.0, TAU - 0.1).unwrap();
        assert!(!m.flip_flag());

        // The flip flag persists across demands until toggled again
        m.set_desired_state(1.0, TAU - 0.1 - PI).unwrap();
        assert!(m.flip_flag());
        m.set_desired_state(1.0, TAU - 0.1 - PI + 0.2).unwrap();
        assert!(m.flip_flag());
    }

    #[test]
    fn test_heading_delta_modes() {
        let absolute = heading_delta(FlipDeltaMode::Absolute, 0.1, TAU - 0.1);
        assert!((absolute - (TAU - 0.2)).abs() < 1e-12);
        assert!(!flip_band_contains(absolute));

        let shortest = heading_delta(FlipDeltaMode::Shortest, 0.1, TAU - 0.1);
        assert!((shortest - 0.2).abs() < 1e-12);
        assert!(!flip_band_contains(shortest));

        // Within half a turn the modes agree
        let absolute = heading_delta(FlipDeltaMode::Absolute, 0.2, 3.2);
        let shortest = heading_delta(FlipDeltaMode::Shortest, 0.2, 3.2);
        assert!((absolute - 3.0).abs() < 1e-12);
        assert!((shortest - 3.0).abs() < 1e-12);

        // Across the wrap a raw difference of 5 is a 2pi - 5 turn
        let shortest = heading_delta(FlipDeltaMode::Shortest, 5.5, 0.5);
        assert!((shortest - (TAU - 5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_current_state_is_physical() {
        let rig = Rig::default();
        let mut m = embedded(&rig);

        m.set_desired_state(1.0, PI).unwrap();
        let s = m.get_current_state().unwrap();

        // The wheel faces 0 and spins backwards, which is what odometry sees
        assert!((s.speed_ms + 1.0).abs() < 1e-12);
        assert!(s.heading_rad.abs() < 1e-12);
    }

    #[test]
    fn test_invalid_demand() {
        let rig = Rig::default();
        let mut m = embedded(&rig);
        assert!(matches!(
            m.set_desired_state(f64::NAN, 0.0),
            Err(ModuleCtrlError::InvalidArgument(_))
        ));
        assert!(ModuleCtrl::new(
            ModuleId::FrontLeft,
            0.0,
            PidParams::new(1.0, 0.0, 0.0, 1.0, 0.0),
            ModuleEqpt {
                drive: Box::new(Motor(rig.drive_rate.clone())),
                steer: SteerEqpt::Embedded(WrappedPositionActuator::new(Box::new(Servo(
                    rig.steer_pos.clone()
                )))),
            }
        )
        .is_err());
    }

    #[test]
    fn test_looped_steer() {
        let rig = Rig::default();
        *rig.steer_pos.borrow_mut() = TAU - 0.1;
        let mut m = looped(&rig);
        m.init().unwrap();
        assert!((m.last_commanded_heading() - (TAU - 0.1)).abs() < 1e-12);

        m.set_desired_state(1.0, TAU - 0.1 + 0.3).unwrap();
        m.periodic(0.02).unwrap();

        // Shortest path from 2pi - 0.1 to 0.2 is +0.3
        assert!((*rig.steer_rate.borrow() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_reset_zero() {
        let rig = Rig::default();
        let mut m = looped(&rig);
        *rig.steer_pos.borrow_mut() = 1.3;
        m.set_desired_state(1.0, PI).unwrap();
        assert!(m.flip_flag());

        m.reset_zero().unwrap();
        assert!(!m.flip_flag());
        assert_eq!(m.last_commanded_heading(), 0.0);
        assert_eq!(*rig.steer_pos.borrow(), 0.0);

        // Holding the new zero produces no steer demand
        m.periodic(0.02).unwrap();
        assert!(rig.steer_rate.borrow().abs() < 1e-12);
    }

    #[test]
    fn test_encoder_fault_stops_steer() {
        let rig = Rig::default();
        let faulted = Rc::new(RefCell::new(false));
        let mut m = ModuleCtrl::new(
            ModuleId::FrontRight,
            0.5,
            PidParams::new(2.0, 0.0, 0.0, 10.0, 0.0),
            ModuleEqpt {
                drive: Box::new(Motor(rig.drive_rate.clone())),
                steer: SteerEqpt::Looped {
                    motor: Box::new(Motor(rig.steer_rate.clone())),
                    encoder: Box::new(FlakyEncoder {
                        pos: rig.steer_pos.clone(),
                        faulted: faulted.clone(),
                    }),
                },
            },
        )
        .unwrap();
        m.init().unwrap();

        m.set_desired_state(1.0, 1.0).unwrap();
        m.periodic(0.02).unwrap();
        assert!((*rig.steer_rate.borrow() - 2.0).abs() < 1e-9);

        *faulted.borrow_mut() = true;
        for _ in 0..50 {
            assert!(matches!(
                m.periodic(0.02),
                Err(ModuleCtrlError::EqptError(EqptError::NotResponding(_)))
            ));
            assert_eq!(*rig.steer_rate.borrow(), 0.0);
        }

        // Feedback returns and the loop picks up where the wheel is
        *faulted.borrow_mut() = false;
        m.periodic(0.02).unwrap();
        assert!((*rig.steer_rate.borrow() - 2.0).abs() < 1e-9);
    }
}
