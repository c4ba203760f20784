//! # Yarrow Core
//!
//! Control primitives for the yarrow quadrotor autopilot. This crate contains
//! only the pure, single-threaded pieces of the control path:
//! - Discrete PID filter (z-domain, marched once per control tick)
//! - Attitude estimator (Euler/gyro conditioning and yaw unwrap)
//! - X-configuration motor mixer with uniform desaturation
//! - Controller configuration record
//!
//! Everything here is free of I/O and clocks so it can be exercised directly
//! in tests; the concurrent fabric around it lives in `yarrow-flight`.

pub mod config;
pub mod estimator;
pub mod mixer;
pub mod pid;

pub use config::{CoreConfig, PidGains};
pub use estimator::{Attitude, AttitudeEstimator, ImuSample};
pub use mixer::{clamp_unit, desaturate, mix};
pub use pid::PidFilter;

/// Control loop rate. The PID coefficient synthesis depends on [`DT`];
/// changing one without the other invalidates the tuning.
pub const CONTROL_HZ: u32 = 200;

/// Control timestep in seconds. Must match [`CONTROL_HZ`].
pub const DT: f32 = 0.005;

/// Derivative low-pass time constant used for all three axis controllers.
pub const PID_TAU: f32 = 0.015;

/// Upper limit of the net thrust control component.
pub const MAX_THRUST_COMPONENT: f32 = 0.8;

/// Max control delta the roll controller can apply.
pub const MAX_ROLL_COMPONENT: f32 = 0.2;

/// Max control delta the pitch controller can apply.
pub const MAX_PITCH_COMPONENT: f32 = 0.2;

/// Max control delta the yaw controller can apply.
pub const MAX_YAW_COMPONENT: f32 = 0.21;

/// Throttle component below which the integrators are held (no windup while
/// sitting on the ground).
pub const INT_CUTOFF_TH: f32 = 0.3;

/// Throttle setpoint below which the yaw setpoint stops tracking the
/// commanded yaw rate.
pub const YAW_CUTOFF_TH: f32 = 0.1;

/// Tight saturation applied to the axis controllers while the throttle
/// setpoint is near zero, so ground disturbances don't spin motors.
pub const LAND_SATURATION: f32 = 0.05;

/// Radians from level within which the arming sequence is allowed to start.
pub const ARM_TIP_THRESHOLD: f32 = 0.2;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
