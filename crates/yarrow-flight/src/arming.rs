//! The arming supervisor: a blocking gesture recognizer.
//!
//! Re-arming is deliberate work. The pilot must have the airframe level and
//! the kill switch released, then sweep the throttle stick down, up, and
//! down again. Only after that does the supervisor reload the configuration,
//! wake the ESCs, and clear the DISARMED latch.

use std::time::Duration;

use yarrow_core::{CoreConfig, ARM_TIP_THRESHOLD, DT};

use crate::drivers::ActuatorDriver;
use crate::shared::{CoreMode, SharedState};

/// Every wait in the sequence polls at this rate and aborts on EXITING.
const ARM_POLL: Duration = Duration::from_millis(100);

/// Stick deflection counting as "down" / "up" in the gesture.
const STICK_GESTURE_TH: f32 = 0.9;

/// Minimum pulses sent to wake the ESCs out of calibration mode.
const ESC_WAKE_PULSES: u32 = 10;

/// Block until the pilot completes the arming gesture, then arm the core.
///
/// Returns the reloaded configuration on success, or `None` if the process
/// started exiting while waiting.
pub fn wait_for_arming_sequence(
    shared: &SharedState,
    actuator: &dyn ActuatorDriver,
    reload_config: &(dyn Fn() -> CoreConfig + Send),
) -> Option<CoreConfig> {
    loop {
        // Wait for a level airframe before anything else.
        wait_until(shared, || level(shared))?;
        wait_until(shared, || {
            !shared
                .user
                .kill_switch
                .load(std::sync::atomic::Ordering::SeqCst)
        })?;

        // Throttle down, up, down.
        wait_until(shared, || {
            shared.user.throttle_stick.load() < -STICK_GESTURE_TH
        })?;
        wait_until(shared, || {
            shared.user.throttle_stick.load() > STICK_GESTURE_TH
        })?;
        wait_until(shared, || {
            shared.user.throttle_stick.load() < -STICK_GESTURE_TH
        })?;

        if level(shared) {
            break;
        }
        log::info!("restart arming sequence with a level airframe");
    }

    // Wake the ESCs at minimum throttle so they don't read the first armed
    // pulses as a calibration request.
    for _ in 0..ESC_WAKE_PULSES {
        for channel in 1..=4u8 {
            actuator.send_pulse_normalized(channel, 0.0);
        }
        std::thread::sleep(Duration::from_secs_f32(DT));
    }

    // Load fresh settings if they were edited while disarmed, and stage
    // them for the core to swap in before its first armed tick.
    let config = reload_config();
    if let Ok(mut slot) = shared.pending_config.lock() {
        *slot = Some(config);
    }

    shared.setpoint.arm(CoreMode::Attitude);
    log::info!("ARMED");
    Some(config)
}

fn level(shared: &SharedState) -> bool {
    shared.state.roll.load().abs() < ARM_TIP_THRESHOLD
        && shared.state.pitch.load().abs() < ARM_TIP_THRESHOLD
}

/// Poll `condition` at the arming rate; `None` means the process is exiting.
fn wait_until(shared: &SharedState, condition: impl Fn() -> bool) -> Option<()> {
    while !condition() {
        std::thread::sleep(ARM_POLL);
        if shared.exiting() {
            return None;
        }
    }
    Some(())
}
