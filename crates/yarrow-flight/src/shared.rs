//! Process-wide flight records shared between the control tick and the
//! soft-real-time threads.
//!
//! The control tick cannot afford locks or indirection, so these records are
//! plain structs of word-sized atomics. Each record has a single documented
//! writer; readers tolerate values that are at most one period stale, and
//! torn reads across *different* fields of the telemetry record are
//! acceptable by design.
//!
//! The one multi-writer field is the core mode: any thread may force it to
//! DISARMED through [`SharedState::disarm`], and only the arming supervisor
//! clears it again via [`CoreSetpoint::arm`]. The core treats DISARMED as
//! sticky until that explicit transition.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use yarrow_core::CoreConfig;

/// An `f32` stored bit-for-bit in an `AtomicU32`. One word per field is all
/// the ordering the fabric needs; cross-field consistency is not promised.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// What the flight core is allowed to do with the motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreMode {
    /// No pulse wider than the calibration minimum ever reaches the ESCs.
    Disarmed = 0,
    /// Pilot commands throttle, roll/pitch angles and yaw rate directly.
    Attitude = 1,
    /// Reserved: attitude setpoint driven by an outer position loop.
    Position = 2,
}

impl CoreMode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CoreMode::Attitude,
            2 => CoreMode::Position,
            _ => CoreMode::Disarmed,
        }
    }
}

/// Pilot-facing flight mode, decoded from the radio by the link watcher and
/// interpreted by the flight stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlightMode {
    EmergencyKill = 0,
    EmergencyLand = 1,
    UserAttitude = 2,
    // Declared so the surface doesn't reshape when they land; the stack
    // treats them as no-ops today.
    UserLoiter = 3,
    UserPositionCartesian = 4,
    UserPositionRadial = 5,
    TargetHold = 6,
}

impl FlightMode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => FlightMode::EmergencyKill,
            1 => FlightMode::EmergencyLand,
            3 => FlightMode::UserLoiter,
            4 => FlightMode::UserPositionCartesian,
            5 => FlightMode::UserPositionRadial,
            6 => FlightMode::TargetHold,
            _ => FlightMode::UserAttitude,
        }
    }
}

/// Process lifecycle, observed by every soft thread at the top of its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Running = 0,
    Paused = 1,
    Exiting = 2,
}

/// Setpoint for the flight core. Written by the flight stack; read once per
/// tick by the core. The core itself integrates the yaw setpoint.
#[derive(Debug, Default)]
pub struct CoreSetpoint {
    mode: AtomicU8,
    /// Desired upward thrust, [0, 1].
    pub throttle: AtomicF32,
    /// Roll angle setpoint (rad).
    pub roll: AtomicF32,
    /// Pitch angle setpoint (rad).
    pub pitch: AtomicF32,
    /// Commanded yaw rate (rad/s).
    pub yaw_rate: AtomicF32,
    /// Accumulated yaw setpoint (rad), integrated by the core while flying.
    pub yaw: AtomicF32,

    // Reserved for POSITION mode.
    pub altitude: AtomicF32,
    pub position_x: AtomicF32,
    pub position_y: AtomicF32,
}

impl CoreSetpoint {
    pub fn mode(&self) -> CoreMode {
        CoreMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Clear the DISARMED latch. Only the arming supervisor calls this,
    /// after the gesture sequence has completed.
    pub fn arm(&self, mode: CoreMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    fn force_disarmed(&self) -> bool {
        let previous = self.mode.swap(CoreMode::Disarmed as u8, Ordering::SeqCst);
        CoreMode::from_u8(previous) != CoreMode::Disarmed
    }
}

/// Most recent values reported by the flight core. Written only by the core;
/// read by the safety supervisor, arming supervisor, printer and telemetry.
#[derive(Debug, Default)]
pub struct CoreState {
    /// Ticks flown since the core started counting (armed ticks only).
    pub control_loops: AtomicU64,

    pub roll: AtomicF32,
    pub pitch: AtomicF32,
    pub yaw: AtomicF32,
    pub droll: AtomicF32,
    pub dpitch: AtomicF32,
    pub dyaw: AtomicF32,

    pub droll_err: AtomicF32,
    pub dpitch_err: AtomicF32,
    pub yaw_err: AtomicF32,
    pub droll_err_integrator: AtomicF32,
    pub dpitch_err_integrator: AtomicF32,
    pub yaw_err_integrator: AtomicF32,

    /// Last control vector: thrust, roll, pitch, yaw components.
    pub control_u: [AtomicF32; 4],
    /// Last normalized motor outputs.
    pub esc_out: [AtomicF32; 4],

    /// Main battery pack voltage.
    pub v_batt: AtomicF32,
}

impl CoreState {
    pub fn esc_out_snapshot(&self) -> [f32; 4] {
        [
            self.esc_out[0].load(),
            self.esc_out[1].load(),
            self.esc_out[2].load(),
            self.esc_out[3].load(),
        ]
    }

    pub fn control_u_snapshot(&self) -> [f32; 4] {
        [
            self.control_u[0].load(),
            self.control_u[1].load(),
            self.control_u[2].load(),
            self.control_u[3].load(),
        ]
    }
}

/// Current pilot command, decoded from the radio. Written only by the link
/// watcher; the flight stack reads it each period.
#[derive(Debug)]
pub struct UserInterface {
    flight_mode: AtomicU8,
    /// Sticks scaled to [-1, 1]; throttle positive up, roll/yaw positive
    /// right, pitch positive up.
    pub throttle_stick: AtomicF32,
    pub roll_stick: AtomicF32,
    pub pitch_stick: AtomicF32,
    pub yaw_stick: AtomicF32,
    /// Asserted kill switch forces disarm regardless of anything else.
    pub kill_switch: AtomicBool,
}

impl Default for UserInterface {
    fn default() -> Self {
        Self {
            flight_mode: AtomicU8::new(FlightMode::UserAttitude as u8),
            throttle_stick: AtomicF32::new(-1.0),
            roll_stick: AtomicF32::default(),
            pitch_stick: AtomicF32::default(),
            yaw_stick: AtomicF32::default(),
            kill_switch: AtomicBool::new(false),
        }
    }
}

impl UserInterface {
    pub fn flight_mode(&self) -> FlightMode {
        FlightMode::from_u8(self.flight_mode.load(Ordering::SeqCst))
    }

    pub fn set_flight_mode(&self, mode: FlightMode) {
        self.flight_mode.store(mode as u8, Ordering::SeqCst);
    }
}

/// The handful of process-wide records, bundled for sharing.
#[derive(Debug, Default)]
pub struct SharedState {
    pub setpoint: CoreSetpoint,
    pub state: CoreState,
    pub user: UserInterface,
    process: AtomicU8,
    /// Config staged by the arming supervisor, applied by the core before
    /// its first armed tick. Held only for the handful of instructions
    /// around a take/replace, never across a wait.
    pub pending_config: Mutex<Option<CoreConfig>>,
}

impl SharedState {
    pub fn process(&self) -> ProcessState {
        match self.process.load(Ordering::SeqCst) {
            1 => ProcessState::Paused,
            2 => ProcessState::Exiting,
            _ => ProcessState::Running,
        }
    }

    pub fn set_process(&self, state: ProcessState) {
        self.process.store(state as u8, Ordering::SeqCst);
    }

    pub fn exiting(&self) -> bool {
        self.process() == ProcessState::Exiting
    }

    /// Latch the core into DISARMED. Safe to call from any thread, any
    /// number of times; the core observes it by its next tick and zeroes
    /// its outputs on the tick it is observed.
    pub fn disarm(&self) {
        if self.setpoint.force_disarmed() {
            log::warn!("DISARMED");
        }
    }

    pub fn armed(&self) -> bool {
        self.setpoint.mode() != CoreMode::Disarmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32_round_trip() {
        let a = AtomicF32::new(-0.25);
        assert_eq!(a.load(), -0.25);
        a.store(3.5);
        assert_eq!(a.load(), 3.5);
    }

    #[test]
    fn test_disarm_is_sticky_and_idempotent() {
        let shared = SharedState::default();
        shared.setpoint.arm(CoreMode::Attitude);
        assert!(shared.armed());

        shared.disarm();
        shared.disarm();
        assert_eq!(shared.setpoint.mode(), CoreMode::Disarmed);

        // Only an explicit arm clears the latch.
        shared.setpoint.arm(CoreMode::Attitude);
        assert!(shared.armed());
    }

    #[test]
    fn test_process_state_transitions() {
        let shared = SharedState::default();
        assert_eq!(shared.process(), ProcessState::Running);
        shared.set_process(ProcessState::Exiting);
        assert!(shared.exiting());
    }
}
