//! # Yarrow Flight
//!
//! The concurrent fabric of the yarrow quadrotor autopilot:
//! - Shared flight records with field-granular atomics and a sticky
//!   DISARMED latch
//! - The 200 Hz flight core, driven by the IMU sample clock
//! - The ~100 Hz flight stack with its blocking arming supervisor
//! - Safety supervisor (tipover), link watcher (loss-of-link escalation)
//! - Flight log (bounded queue into CSV), MAVLink telemetry, LEDs, console
//! - Driver trait contracts for everything that touches hardware
//!
//! The hard-real-time path (the core tick) never blocks and never errors;
//! every supervisor influences it only by writing the shared setpoint.

pub mod arming;
pub mod config_store;
pub mod core;
pub mod drivers;
pub mod flight_log;
pub mod indicator;
pub mod link;
pub mod printer;
pub mod runtime;
pub mod safety;
pub mod shared;
pub mod stack;
pub mod telemetry;

pub use self::core::FlightCore;
pub use drivers::{
    ActuatorDriver, ImuDriver, ImuEvent, LedDriver, PauseButton, RadioDriver, TelemetrySink,
};
pub use runtime::{start, Drivers, FlightProcess, Options};
pub use shared::{CoreMode, FlightMode, ProcessState, SharedState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
