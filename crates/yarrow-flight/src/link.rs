//! Link watcher: radio intake and loss-of-link escalation.
//!
//! Polls the radio at ~100 Hz. Fresh frames are decoded into the user
//! interface record; silence escalates from emergency landing (0.3 s) to a
//! full disarm (5 s). The timeouts only start counting after the first good
//! frame, so a cold start with the transmitter off isn't a loss of link.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::drivers::RadioDriver;
use crate::shared::{CoreMode, FlightMode, SharedState};

/// Silence longer than this switches to emergency landing.
pub const LAND_TIMEOUT: Duration = Duration::from_millis(300);

/// Silence longer than this disarms outright.
pub const DISARM_TIMEOUT: Duration = Duration::from_secs(5);

const LINK_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
pub struct LinkWatcher {
    /// Arrival time of the most recent good frame; `None` until the radio
    /// has spoken once.
    last_frame: Option<Instant>,
    /// Set when silence forced an emergency landing. Resumed frames keep
    /// the landing mode until the pilot flips the mode switch.
    lost_link: bool,
    /// Last observed polarity of the mode channel.
    last_mode_switch: Option<bool>,
}

impl LinkWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// One poll of the radio. `now` is passed in so the timeout arithmetic
    /// is testable without waiting out real silence.
    pub fn step(&mut self, now: Instant, radio: &dyn RadioDriver, shared: &SharedState) {
        if radio.has_new_frame() {
            self.last_frame = Some(now);
            self.decode_frame(radio, shared);
            return;
        }

        let Some(last) = self.last_frame else {
            return;
        };
        let silence = now.duration_since(last);

        if shared.setpoint.mode() != CoreMode::Disarmed && silence > DISARM_TIMEOUT {
            log::warn!("lost radio for {:.1} s, disarming", silence.as_secs_f32());
            shared.disarm();
        } else if shared.user.flight_mode() != FlightMode::EmergencyLand && silence > LAND_TIMEOUT {
            log::warn!(
                "lost radio for {:.1} s, emergency landing",
                silence.as_secs_f32()
            );
            self.lost_link = true;
            shared.user.set_flight_mode(FlightMode::EmergencyLand);
            shared.user.throttle_stick.store(-1.0);
            shared.user.roll_stick.store(0.0);
            shared.user.pitch_stick.store(0.0);
            shared.user.yaw_stick.store(0.0);
        }
    }

    fn decode_frame(&mut self, radio: &dyn RadioDriver, shared: &SharedState) {
        let user = &shared.user;

        // Kill switch down means emergency kill; don't even look at the
        // sticks. The flight stack also reacts to the flag, but disarming
        // here too survives a wedged stack thread.
        if radio.channel_normalized(5) < 0.0 {
            user.kill_switch
                .store(true, std::sync::atomic::Ordering::SeqCst);
            shared.disarm();
            return;
        }
        user.kill_switch
            .store(false, std::sync::atomic::Ordering::SeqCst);

        user.throttle_stick.store(radio.channel_normalized(1));
        // Positive roll tips right, positive pitch tips back; both sticks
        // arrive with the opposite sense.
        user.roll_stick.store(-radio.channel_normalized(2));
        user.pitch_stick.store(-radio.channel_normalized(3));
        user.yaw_stick.store(radio.channel_normalized(4));

        // Both switch positions select attitude flight until a second mode
        // exists. After a loss of link the landing mode stays latched until
        // the pilot actually flips the switch; merely regaining frames is
        // not a recovery command.
        let switch_high = radio.channel_normalized(6) > 0.0;
        let requested = FlightMode::UserAttitude;
        if self.lost_link {
            if self.last_mode_switch.is_some() && self.last_mode_switch != Some(switch_high) {
                self.lost_link = false;
                user.set_flight_mode(requested);
            }
        } else {
            user.set_flight_mode(requested);
        }
        self.last_mode_switch = Some(switch_high);
    }

    /// Loop until the process exits.
    pub fn run(mut self, radio: Arc<dyn RadioDriver>, shared: Arc<SharedState>) {
        while !shared.exiting() {
            self.step(Instant::now(), radio.as_ref(), &shared);
            std::thread::sleep(LINK_PERIOD);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct ScriptedRadio {
        fresh: AtomicBool,
        channels: Mutex<[f32; 6]>,
    }

    impl ScriptedRadio {
        fn new() -> Self {
            Self {
                fresh: AtomicBool::new(false),
                channels: Mutex::new([0.0; 6]),
            }
        }

        fn frame(&self, channels: [f32; 6]) {
            *self.channels.lock().unwrap() = channels;
            self.fresh.store(true, Ordering::SeqCst);
        }
    }

    impl RadioDriver for ScriptedRadio {
        fn has_new_frame(&self) -> bool {
            self.fresh.swap(false, Ordering::SeqCst)
        }

        fn channel_normalized(&self, channel: u8) -> f32 {
            self.channels.lock().unwrap()[channel as usize - 1]
        }
    }

    #[test]
    fn test_frame_decode_signs() {
        let radio = ScriptedRadio::new();
        let shared = SharedState::default();
        let mut watcher = LinkWatcher::new();

        radio.frame([0.3, 0.5, -0.25, 0.8, 1.0, 1.0]);
        watcher.step(Instant::now(), &radio, &shared);

        assert_eq!(shared.user.throttle_stick.load(), 0.3);
        assert_eq!(shared.user.roll_stick.load(), -0.5);
        assert_eq!(shared.user.pitch_stick.load(), 0.25);
        assert_eq!(shared.user.yaw_stick.load(), 0.8);
        assert!(!shared.user.kill_switch.load(Ordering::SeqCst));
        assert_eq!(shared.user.flight_mode(), FlightMode::UserAttitude);
    }

    #[test]
    fn test_kill_channel_disarms_immediately() {
        let radio = ScriptedRadio::new();
        let shared = SharedState::default();
        shared.setpoint.arm(CoreMode::Attitude);
        let mut watcher = LinkWatcher::new();

        radio.frame([0.0, 0.0, 0.0, 0.0, -1.0, 1.0]);
        watcher.step(Instant::now(), &radio, &shared);

        assert!(shared.user.kill_switch.load(Ordering::SeqCst));
        assert_eq!(shared.setpoint.mode(), CoreMode::Disarmed);
    }

    #[test]
    fn test_silence_escalates_to_emergency_land() {
        let radio = ScriptedRadio::new();
        let shared = SharedState::default();
        shared.setpoint.arm(CoreMode::Attitude);
        let mut watcher = LinkWatcher::new();

        let t0 = Instant::now();
        radio.frame([0.5, 0.0, 0.0, 0.0, 1.0, 1.0]);
        watcher.step(t0, &radio, &shared);

        // 0.31 s of silence: land, don't disarm.
        watcher.step(t0 + Duration::from_millis(310), &radio, &shared);
        assert_eq!(shared.user.flight_mode(), FlightMode::EmergencyLand);
        assert_eq!(shared.user.throttle_stick.load(), -1.0);
        assert_eq!(shared.setpoint.mode(), CoreMode::Attitude);

        // 5.01 s of silence: disarm.
        watcher.step(t0 + Duration::from_millis(5010), &radio, &shared);
        assert_eq!(shared.setpoint.mode(), CoreMode::Disarmed);
    }

    #[test]
    fn test_no_timeout_before_first_frame() {
        let radio = ScriptedRadio::new();
        let shared = SharedState::default();
        shared.setpoint.arm(CoreMode::Attitude);
        let mut watcher = LinkWatcher::new();

        let t0 = Instant::now();
        watcher.step(t0, &radio, &shared);
        watcher.step(t0 + Duration::from_secs(60), &radio, &shared);

        assert_eq!(shared.setpoint.mode(), CoreMode::Attitude);
        assert_eq!(shared.user.flight_mode(), FlightMode::UserAttitude);
    }

    #[test]
    fn test_resumed_frames_do_not_clear_emergency_land() {
        let radio = ScriptedRadio::new();
        let shared = SharedState::default();
        shared.setpoint.arm(CoreMode::Attitude);
        let mut watcher = LinkWatcher::new();

        let t0 = Instant::now();
        radio.frame([0.5, 0.0, 0.0, 0.0, 1.0, 1.0]);
        watcher.step(t0, &radio, &shared);
        watcher.step(t0 + Duration::from_millis(350), &radio, &shared);
        assert_eq!(shared.user.flight_mode(), FlightMode::EmergencyLand);

        // Frames come back with the switch untouched: still landing.
        radio.frame([0.5, 0.0, 0.0, 0.0, 1.0, 1.0]);
        watcher.step(t0 + Duration::from_millis(400), &radio, &shared);
        assert_eq!(shared.user.flight_mode(), FlightMode::EmergencyLand);

        // The pilot flips the mode switch: that is the recovery command.
        radio.frame([0.5, 0.0, 0.0, 0.0, 1.0, -1.0]);
        watcher.step(t0 + Duration::from_millis(450), &radio, &shared);
        assert_eq!(shared.user.flight_mode(), FlightMode::UserAttitude);
    }
}
