//! Main swerve drivetrain executable entry point.
//!
//! # Architecture
//!
//! The executable runs the drivetrain control core against simulated
//! equipment, executing a single drive command given on the command line for
//! a fixed duration:
//!
//!     - Initialise session, logging and parameters
//!     - Build the simulated chassis and the drivetrain on top of it
//!     - Execute the drive command
//!     - Main loop:
//!         - DriveCtrl processing (sensing, odometry, control, dispatch)
//!         - Simulation step
//!         - Archive writing
//!         - Cycle management
//!     - Stop the drivetrain and save a run summary
//!
//! # Modules
//!
//! All cyclic modules (e.g. `drive_ctrl`) shall provide a public struct
//! implementing the `util::module::State` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use swerve_lib::{
    drive_ctrl::{DriveCmd, DriveCtrl, DriveTm, InputData, Params, StatusReport},
    eqpt::sim::{SimChassis, SimParams},
    module_ctrl::ModuleId,
    odometry::Pose,
};
use util::{
    archive::{Archived, Archiver},
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "swerve_exec",
    about = "Run the swerve drivetrain against simulated equipment"
)]
struct Opts {
    /// How long to run the command for, in seconds.
    #[structopt(short, long, default_value = "5.0")]
    duration_s: f64,

    /// Run cycles back to back instead of in real time.
    #[structopt(long)]
    fast: bool,

    /// The drive command to execute.
    #[structopt(subcommand)]
    cmd: DriveCmd,
}

/// Parameters of the executable itself.
#[derive(Debug, Deserialize)]
struct ExecParams {
    /// Target period of one cycle.
    ///
    /// Units: seconds
    cycle_period_s: f64,

    /// Pose the vehicle starts at, both in the simulation and the estimate.
    initial_pose: Pose,

    sim: SimParams,
}

/// Data carried between cycles.
#[derive(Default)]
struct DataStore {
    num_cycles: u64,
    sim_time_s: f64,

    drive_tm: Option<DriveTm>,
    drive_report: StatusReport,
    true_pose: Pose,

    num_cycle_overruns: u64,

    arch_tm: Archiver,
    arch_modules: Archiver,
}

/// One row of the drivetrain archive.
#[derive(Serialize)]
struct TmRecord {
    time_s: f64,
    x_m: f64,
    y_m: f64,
    theta_rad: f64,
    true_x_m: f64,
    true_y_m: f64,
    true_theta_rad: f64,
    vx_dem_ms: f64,
    vy_dem_ms: f64,
    omega_dem_rads: f64,
    heading_goal_rad: Option<f64>,
    heading_goal_reached: bool,
    heading_hold_active: bool,
    linear_limited: bool,
    angular_limited: bool,
    module_speed_limited: bool,
    heading_stale: bool,
    num_module_faults: usize,
    stopped: bool,
}

/// One row of the module archive.
#[derive(Serialize)]
struct ModuleRecord {
    time_s: f64,
    module: String,
    speed_ms: f64,
    heading_rad: f64,
    drive_rate_dem_rads: f64,
    steer_heading_dem_rad: f64,
    flipped: bool,
    fault: bool,
}

/// Summary of the run, saved at the end of the session.
#[derive(Serialize)]
struct RunSummary {
    cmd: DriveCmd,
    num_cycles: u64,
    sim_time_s: f64,
    num_cycle_overruns: u64,
    final_pose: Pose,
    true_pose: Pose,
    heading_goal_reached: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("swerve_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Swerve Drivetrain Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opts);

    if !(opts.duration_s > 0.0) {
        return Err(eyre!(
            "Expected a positive duration, found {}",
            opts.duration_s
        ));
    }

    // ---- LOAD PARAMETERS ----

    let exec_params: ExecParams =
        util::params::load("swerve_exec.toml").wrap_err("Could not load exec params")?;
    let drive_params: Params =
        util::params::load("drive_ctrl.toml").wrap_err("Could not load DriveCtrl params")?;

    if !(exec_params.cycle_period_s > 0.0) {
        return Err(eyre!(
            "Expected a positive cycle period, found {}",
            exec_params.cycle_period_s
        ));
    }

    info!("Parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut sim = SimChassis::new(
        exec_params.sim,
        &drive_params.module_offsets_m,
        drive_params.wheel_radius_m,
    )
    .wrap_err("Failed to create the simulated chassis")?;
    sim.set_true_pose(exec_params.initial_pose);

    let eqpt = sim.eqpt(drive_params.steer_mode);

    let mut drive_ctrl =
        DriveCtrl::new(drive_params, eqpt).wrap_err("Failed to create DriveCtrl")?;
    drive_ctrl
        .init(exec_params.initial_pose)
        .wrap_err("Failed to initialise DriveCtrl")?;
    info!("DriveCtrl init complete");

    let mut ds = DataStore {
        true_pose: sim.true_pose(),
        arch_tm: Archiver::from_path(&session, "drive_ctrl/tm.csv")
            .map_err(|e| eyre!("Failed to create the tm archive: {}", e))?,
        arch_modules: Archiver::from_path(&session, "drive_ctrl/modules.csv")
            .map_err(|e| eyre!("Failed to create the module archive: {}", e))?,
        ..Default::default()
    };

    info!("Module initialisation complete\n");

    // ---- EXECUTE COMMAND ----

    drive_ctrl
        .exec_cmd(&opts.cmd)
        .wrap_err("Failed to execute the drive command")?;
    info!("Executing {:?} for {:.02} s", opts.cmd, opts.duration_s);

    // ---- MAIN LOOP ----

    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s);
    let input = InputData {
        dt_s: exec_params.cycle_period_s,
    };

    while ds.sim_time_s < opts.duration_s {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        ds.cycle(&mut drive_ctrl, &mut sim, &input);

        // ---- WRITE ARCHIVES ----

        if let Err(e) = ds.write() {
            warn!("Could not write archives: {}", e);
        }

        // ---- CYCLE MANAGEMENT ----

        if !opts.fast {
            let cycle_dur = Instant::now() - cycle_start_instant;

            match cycle_period.checked_sub(cycle_dur) {
                Some(d) => thread::sleep(d),
                None => {
                    warn!(
                        "Cycle overran by {:.06} s",
                        cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                    );
                    ds.num_cycle_overruns += 1;
                }
            }
        }
    }

    // ---- SHUTDOWN ----

    // One more cycle so the stop reaches the actuators
    drive_ctrl.stop();
    ds.cycle(&mut drive_ctrl, &mut sim, &input);
    if let Err(e) = ds.write() {
        warn!("Could not write archives: {}", e);
    }

    let final_pose = drive_ctrl.get_current_pose();
    info!("Final pose estimate: {:?}", final_pose);
    info!("Final true pose:     {:?}", ds.true_pose);

    session.save(
        "summary.json",
        RunSummary {
            cmd: opts.cmd,
            num_cycles: ds.num_cycles,
            sim_time_s: ds.sim_time_s,
            num_cycle_overruns: ds.num_cycle_overruns,
            final_pose,
            true_pose: ds.true_pose,
            heading_goal_reached: ds
                .drive_tm
                .map(|tm| tm.heading_goal_reached)
                .unwrap_or(false),
        },
    );

    info!("End of execution");

    session.exit();

    Ok(())
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Run one cycle of the drivetrain and the simulation.
    fn cycle(&mut self, drive_ctrl: &mut DriveCtrl, sim: &mut SimChassis, input: &InputData) {
        match drive_ctrl.proc(input) {
            Ok((tm, report)) => {
                self.drive_tm = Some(tm);
                self.drive_report = report;
            }
            Err(e) => {
                // Only misuse can cause this, so report and carry on with the
                // previous output
                warn!("Error during DriveCtrl processing: {}", e)
            }
        }

        if let Err(e) = sim.step(input.dt_s) {
            warn!("Simulation step failed: {}", e);
        }

        self.true_pose = sim.true_pose();
        self.num_cycles += 1;
        self.sim_time_s = self.num_cycles as f64 * input.dt_s;
    }
}

impl Archived for DataStore {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let tm = match self.drive_tm {
            Some(tm) => tm,
            None => return Ok(()),
        };
        let report = self.drive_report;

        self.arch_tm.serialise(TmRecord {
            time_s: self.sim_time_s,
            x_m: tm.pose.x_m,
            y_m: tm.pose.y_m,
            theta_rad: tm.pose.theta_rad,
            true_x_m: self.true_pose.x_m,
            true_y_m: self.true_pose.y_m,
            true_theta_rad: self.true_pose.theta_rad,
            vx_dem_ms: tm.vel_dem.vx_ms,
            vy_dem_ms: tm.vel_dem.vy_ms,
            omega_dem_rads: tm.vel_dem.omega_rads,
            heading_goal_rad: tm.heading_goal_rad,
            heading_goal_reached: tm.heading_goal_reached,
            heading_hold_active: report.heading_hold_active,
            linear_limited: report.linear_limited,
            angular_limited: report.angular_limited,
            module_speed_limited: report.module_speed_limited,
            heading_stale: report.heading_stale,
            num_module_faults: report.module_faults.iter().filter(|f| **f).count(),
            stopped: tm.stopped,
        })?;

        for id in ModuleId::ALL.iter() {
            let i = id.index();
            self.arch_modules.serialise(ModuleRecord {
                time_s: self.sim_time_s,
                module: id.to_string(),
                speed_ms: tm.measured[i].speed_ms,
                heading_rad: tm.measured[i].heading_rad,
                drive_rate_dem_rads: tm.dems[i].drive_rate_rads,
                steer_heading_dem_rad: tm.dems[i].steer_heading_rad,
                flipped: tm.dems[i].flipped,
                fault: report.module_faults[i],
            })?;
        }

        Ok(())
    }
}
