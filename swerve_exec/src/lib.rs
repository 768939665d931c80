//! # Swerve library.
//!
//! This library contains the control core of a four module swerve drivetrain,
//! and allows other crates in the workspace (and the benchmarks) to access
//! it.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Drivetrain control - turns vehicle level commands into module demands and
/// tracks the vehicle's pose
pub mod drive_ctrl;

/// Equipment interfaces - the capabilities required of motors and sensors, and
/// a simulation implementing them
pub mod eqpt;

/// Kinematics - transforms between vehicle and module velocities
pub mod kinematics;

/// Module control - drives a single module's actuators, applying the flip
/// optimisation
pub mod module_ctrl;

/// Odometry - dead-reckoned pose estimation
pub mod odometry;

/// Continuous PID controller - closed loop control over wrapping domains
pub mod pid;
