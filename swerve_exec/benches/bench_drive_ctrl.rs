//! # Drivetrain Control Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use swerve_lib::{
    drive_ctrl::{DriveCtrl, InputData, Params},
    eqpt::sim::{SimChassis, SimParams},
    kinematics::{ModuleOffset, SwerveKinematics, VehicleVelocity},
    module_ctrl::SteerMode,
    odometry::Pose,
    pid::PidParams,
};
use util::module::State;

const DT: f64 = 0.02;

fn params(steer_mode: SteerMode) -> Params {
    Params {
        module_offsets_m: [
            ModuleOffset::new(0.3, 0.3),
            ModuleOffset::new(0.3, -0.3),
            ModuleOffset::new(-0.3, 0.3),
            ModuleOffset::new(-0.3, -0.3),
        ],
        wheel_radius_m: 0.05,
        max_linear_speed_ms: 2.0,
        max_angular_speed_rads: 4.0,
        max_module_speed_ms: 2.5,
        steer_mode,
        steer_pid: PidParams::new(20.0, 0.0, 0.0, 30.0, 0.0),
        heading_pid: PidParams::new(4.0, 0.1, 0.0, 4.0, 0.5),
        heading_max_rate_rads: 3.0,
        heading_max_accel_radss: 6.0,
        heading_tolerance_rad: 0.02,
    }
}

fn drive_ctrl_benchmark(c: &mut Criterion) {
    // ---- Kinematics ----

    let p = params(SteerMode::Looped);
    let kin = SwerveKinematics::new(&p.module_offsets_m).unwrap();
    let vel = VehicleVelocity::new(1.0, 0.5, 1.5);
    let states = kin.inverse(&vel);

    c.bench_function("SwerveKinematics::inverse", |b| b.iter(|| kin.inverse(&vel)));
    c.bench_function("SwerveKinematics::forward", |b| {
        b.iter(|| kin.forward(&states).unwrap())
    });

    // ---- Full cycle, field frame with heading hold ----

    for &mode in [SteerMode::Embedded, SteerMode::Looped].iter() {
        let p = params(mode);
        let mut sim =
            SimChassis::new(SimParams::default(), &p.module_offsets_m, p.wheel_radius_m).unwrap();
        let mut ctrl = DriveCtrl::new(p, sim.eqpt(mode)).unwrap();
        ctrl.init(Pose::default()).unwrap();
        ctrl.drive_field_frame(1.0, 0.5, 0.0).unwrap();

        let input = InputData { dt_s: DT };

        c.bench_function(&format!("DriveCtrl::proc::{:?}", mode), |b| {
            b.iter(|| {
                ctrl.proc(&input).unwrap();
                sim.step(DT).unwrap();
            })
        });
    }
}

criterion_group!(benches, drive_ctrl_benchmark);
criterion_main!(benches);
