//! Safety supervisor: tipover detection.
//!
//! A quadrotor past 1.5 rad of roll or pitch is not flying anymore, it is
//! crashing; cut the motors before the props dig in.

use std::sync::Arc;
use std::time::Duration;

use crate::shared::{CoreMode, SharedState};

/// Kill the propellers if roll or pitch passes this angle (rad).
pub const TIP_THRESHOLD: f32 = 1.5;

const SAFETY_PERIOD: Duration = Duration::from_millis(50);

/// One ~20 Hz pass of the tipover check.
pub fn step(shared: &SharedState) {
    if shared.setpoint.mode() == CoreMode::Disarmed {
        return;
    }
    let roll = shared.state.roll.load();
    let pitch = shared.state.pitch.load();
    if roll.abs() > TIP_THRESHOLD || pitch.abs() > TIP_THRESHOLD {
        log::warn!("tip detected (roll {roll:.2}, pitch {pitch:.2})");
        shared.disarm();
    }
}

/// Loop until the process exits.
pub fn run(shared: Arc<SharedState>) {
    while !shared.exiting() {
        step(&shared);
        std::thread::sleep(SAFETY_PERIOD);
    }
}
