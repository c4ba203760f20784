//! The flight stack: maps pilot intent onto core setpoints.
//!
//! Runs cooperatively at ~100 Hz. It is the single writer of the setpoint
//! record (apart from the disarm latch), and it owns re-arming: whenever the
//! core is disarmed it parks in the arming supervisor until the pilot flies
//! the gesture sequence. Arming is the only place the DISARMED latch is
//! cleared; the mode dispatch here never re-arms on its own.

use std::sync::Arc;
use std::time::Duration;

use yarrow_core::CoreConfig;

use crate::arming;
use crate::drivers::ActuatorDriver;
use crate::shared::{CoreMode, FlightMode, SharedState};

/// Throttle held while emergency landing.
const EMERGENCY_LAND_THR: f32 = 0.15;

const STACK_PERIOD: Duration = Duration::from_millis(10);

pub struct FlightStack {
    shared: Arc<SharedState>,
    actuator: Arc<dyn ActuatorDriver>,
    reload_config: Box<dyn Fn() -> CoreConfig + Send>,
    config: CoreConfig,
    previous_flight_mode: Option<FlightMode>,
}

impl FlightStack {
    pub fn new(
        shared: Arc<SharedState>,
        actuator: Arc<dyn ActuatorDriver>,
        config: CoreConfig,
        reload_config: Box<dyn Fn() -> CoreConfig + Send>,
    ) -> Self {
        Self {
            shared,
            actuator,
            reload_config,
            config,
            previous_flight_mode: None,
        }
    }

    /// Loop until the process exits.
    pub fn run(&mut self) {
        while !self.shared.exiting() {
            self.step();
            if self.shared.setpoint.mode() == CoreMode::Disarmed {
                if let Some(reloaded) = arming::wait_for_arming_sequence(
                    &self.shared,
                    self.actuator.as_ref(),
                    &self.reload_config,
                ) {
                    // Track the gains the supervisor handed to the core so
                    // stick scaling follows the same file.
                    self.config = reloaded;
                }
                // Any future pre-flight checks go here.
            }
            std::thread::sleep(STACK_PERIOD);
        }
    }

    /// One pass of the mode dispatch. Split out from [`run`] so the mapping
    /// is testable without threads.
    pub fn step(&mut self) {
        let user = &self.shared.user;
        let setpoint = &self.shared.setpoint;
        let flight_mode = user.flight_mode();

        if self.previous_flight_mode != Some(flight_mode) {
            log::info!("flight_mode: {flight_mode:?}");
            self.previous_flight_mode = Some(flight_mode);
        }

        // Kill switch beats everything else.
        if flight_mode == FlightMode::EmergencyKill
            || user.kill_switch.load(std::sync::atomic::Ordering::SeqCst)
        {
            self.shared.disarm();
            return;
        }

        if setpoint.mode() == CoreMode::Disarmed {
            return;
        }

        match flight_mode {
            FlightMode::UserAttitude => {
                // Throttle stick (-1, 1) to throttle (0, 1); angles and yaw
                // rate scaled by the configured maxima.
                setpoint
                    .throttle
                    .store((user.throttle_stick.load() + 1.0) / 2.0);
                setpoint
                    .roll
                    .store(user.roll_stick.load() * self.config.max_roll_setpoint);
                setpoint
                    .pitch
                    .store(user.pitch_stick.load() * self.config.max_pitch_setpoint);
                setpoint
                    .yaw_rate
                    .store(user.yaw_stick.load() * self.config.max_yaw_rate);
            }
            FlightMode::EmergencyLand => {
                setpoint.throttle.store(EMERGENCY_LAND_THR);
                setpoint.roll.store(0.0);
                setpoint.pitch.store(0.0);
                setpoint.yaw_rate.store(0.0);
            }
            FlightMode::EmergencyKill => unreachable!("handled above"),
            // Future modes; nothing to do yet.
            FlightMode::UserLoiter
            | FlightMode::UserPositionCartesian
            | FlightMode::UserPositionRadial
            | FlightMode::TargetHold => {}
        }
    }
}
