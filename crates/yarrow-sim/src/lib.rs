//! # Yarrow Sim
//!
//! Software-in-the-loop drivers for the yarrow autopilot: a small attitude
//! plant that answers the IMU and actuator contracts, plus scripted radio,
//! LED and button stand-ins. The flight binary flies this vehicle by
//! default, and the integration tests close their loops through it.

pub mod radio;
pub mod vehicle;

pub use radio::{spawn_script, ScriptFrame, SimButton, SimLeds, SimRadio};
pub use vehicle::{SimParams, SimVehicle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
