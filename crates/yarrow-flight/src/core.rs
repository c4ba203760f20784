//! The flight core: the hard-real-time attitude loop.
//!
//! One tick runs for every IMU sample at 200 Hz, triggered by the driver's
//! sample clock. Within a tick the order is fixed: estimator update, setpoint
//! read, controller march, actuator write. The tick never blocks and never
//! returns an error; while disarmed it resets and returns, and the
//! supervisors drive it entirely through the shared setpoint.

use std::sync::Arc;

use yarrow_core::{
    clamp_unit, desaturate, mix, AttitudeEstimator, CoreConfig, ImuSample, PidFilter, DT,
    INT_CUTOFF_TH, LAND_SATURATION, MAX_PITCH_COMPONENT, MAX_ROLL_COMPONENT, MAX_THRUST_COMPONENT,
    MAX_YAW_COMPONENT, PID_TAU, YAW_CUTOFF_TH,
};

use crate::drivers::{ActuatorDriver, ImuDriver, ImuEvent};
use crate::flight_log::{LogRecord, LogSender};
use crate::shared::{CoreMode, SharedState};

/// Throttle setpoint below which the axis controllers are pinned to the
/// landing saturation band.
const LAND_SATURATION_TH: f32 = 0.1;

pub struct FlightCore {
    shared: Arc<SharedState>,
    actuator: Arc<dyn ActuatorDriver>,
    log: Option<LogSender>,

    config: CoreConfig,
    estimator: AttitudeEstimator,
    roll_ctrl: PidFilter,
    pitch_ctrl: PidFilter,
    yaw_ctrl: PidFilter,

    droll_err_integrator: f32,
    dpitch_err_integrator: f32,
    yaw_err_integrator: f32,

    previous_mode: CoreMode,
    control_loops: u64,
}

impl FlightCore {
    pub fn new(
        shared: Arc<SharedState>,
        actuator: Arc<dyn ActuatorDriver>,
        log: Option<LogSender>,
        config: CoreConfig,
    ) -> Self {
        let (roll_ctrl, pitch_ctrl, yaw_ctrl) = synthesize_filters(&config);
        Self {
            shared,
            actuator,
            log,
            estimator: AttitudeEstimator::new(config.imu_roll_trim, config.imu_pitch_trim),
            config,
            roll_ctrl,
            pitch_ctrl,
            yaw_ctrl,
            droll_err_integrator: 0.0,
            dpitch_err_integrator: 0.0,
            yaw_err_integrator: 0.0,
            previous_mode: CoreMode::Disarmed,
            control_loops: 0,
        }
    }

    /// Drive ticks off the IMU sample clock until the driver stops or the
    /// process begins exiting. A missed read skips the tick.
    pub fn run(&mut self, imu: &dyn ImuDriver) {
        loop {
            if self.shared.exiting() {
                break;
            }
            match imu.next_event() {
                ImuEvent::Sample(sample) => self.tick(&sample),
                ImuEvent::Missed => continue,
                ImuEvent::Stopped => break,
            }
        }
    }

    /// One pass of the control loop for a fresh IMU sample.
    pub fn tick(&mut self, sample: &ImuSample) {
        let shared = Arc::clone(&self.shared);
        let setpoint = &shared.setpoint;
        let state = &shared.state;
        let mode = setpoint.mode();

        // First tick since leaving DISARMED: swap in the config the arming
        // supervisor staged, and measure yaw from the current heading.
        let just_armed = self.previous_mode == CoreMode::Disarmed && mode != CoreMode::Disarmed;
        if just_armed {
            self.apply_pending_config();
            self.estimator.capture_origin(sample);
        }

        let att = self.estimator.update(sample);
        state.roll.store(att.roll);
        state.pitch.store(att.pitch);
        state.yaw.store(att.yaw);
        state.droll.store(att.droll);
        state.dpitch.store(att.dpitch);
        state.dyaw.store(att.dyaw);

        match mode {
            CoreMode::Disarmed => {
                self.reset_controllers();
                setpoint.yaw.store(0.0);
                for out in &state.esc_out {
                    out.store(0.0);
                }
                state.droll_err_integrator.store(0.0);
                state.dpitch_err_integrator.store(0.0);
                state.yaw_err_integrator.store(0.0);
                self.previous_mode = CoreMode::Disarmed;
                return;
            }
            CoreMode::Position => {
                // Reserved: outer position loop writes the attitude setpoint.
            }
            CoreMode::Attitude => {
                // Only while flying does the yaw setpoint track the
                // commanded rate.
                if setpoint.throttle.load() > YAW_CUTOFF_TH {
                    setpoint
                        .yaw
                        .store(setpoint.yaw.load() + DT * setpoint.yaw_rate.load());
                }
            }
        }

        // Throttle channel, compensated so net vertical thrust survives
        // roll/pitch tilt.
        let sp_throttle = setpoint.throttle.load();
        let thr =
            sp_throttle * (MAX_THRUST_COMPONENT - self.config.idle_throttle) + self.config.idle_throttle;
        let u0 = thr / (att.roll.cos() * att.pitch.cos());

        // Outer loop: angle error to rate setpoint.
        let droll_setpoint = (setpoint.roll.load() - att.roll) * self.config.roll_rate_per_rad;
        let dpitch_setpoint = (setpoint.pitch.load() - att.pitch) * self.config.pitch_rate_per_rad;
        let droll_err = droll_setpoint - att.droll;
        let dpitch_err = dpitch_setpoint - att.dpitch;
        let yaw_err = setpoint.yaw.load() - att.yaw;

        // Only run the integrators if airborne.
        if u0 > INT_CUTOFF_TH {
            self.droll_err_integrator += droll_err * DT;
            self.dpitch_err_integrator += dpitch_err * DT;
            self.yaw_err_integrator += yaw_err * DT;
        }

        if just_armed {
            // Give the filters a consistent history so the first armed tick
            // doesn't produce a derivative kick.
            self.roll_ctrl.preload(droll_err);
            self.pitch_ctrl.preload(dpitch_err);
        }

        self.roll_ctrl.march(droll_err);
        self.pitch_ctrl.march(dpitch_err);
        self.yaw_ctrl.march(yaw_err);

        if sp_throttle < LAND_SATURATION_TH {
            self.roll_ctrl.saturate(-LAND_SATURATION, LAND_SATURATION);
            self.pitch_ctrl.saturate(-LAND_SATURATION, LAND_SATURATION);
            self.yaw_ctrl.saturate(-LAND_SATURATION, LAND_SATURATION);
        } else {
            self.roll_ctrl
                .saturate(-MAX_ROLL_COMPONENT, MAX_ROLL_COMPONENT);
            self.pitch_ctrl
                .saturate(-MAX_PITCH_COMPONENT, MAX_PITCH_COMPONENT);
            self.yaw_ctrl.saturate(-MAX_YAW_COMPONENT, MAX_YAW_COMPONENT);
        }

        let u = [
            u0,
            self.roll_ctrl.output(),
            self.pitch_ctrl.output(),
            self.yaw_ctrl.output(),
        ];

        let mut esc = mix(u);
        desaturate(&mut esc);

        if self.previous_mode == CoreMode::Disarmed {
            // The ESCs were idle through the whole disarmed stretch; one
            // minimum-width pulse on every channel keeps them out of
            // calibration mode before real commands start.
            for channel in 1..=4u8 {
                self.actuator.send_pulse_normalized(channel, 0.0);
            }
        } else {
            clamp_unit(&mut esc);
            for (i, &value) in esc.iter().enumerate() {
                self.actuator.send_pulse_normalized(i as u8 + 1, value);
                state.esc_out[i].store(value);
                state.control_u[i].store(u[i]);
            }
        }

        state.droll_err.store(droll_err);
        state.dpitch_err.store(dpitch_err);
        state.yaw_err.store(yaw_err);
        state.droll_err_integrator.store(self.droll_err_integrator);
        state.dpitch_err_integrator.store(self.dpitch_err_integrator);
        state.yaw_err_integrator.store(self.yaw_err_integrator);

        if let Some(log) = &self.log {
            log.push(LogRecord {
                num_loops: self.control_loops,
                roll: att.roll,
                pitch: att.pitch,
                yaw: att.yaw,
                droll: att.droll,
                dpitch: att.dpitch,
                dyaw: att.dyaw,
                u,
                esc: state.esc_out_snapshot(),
                v_batt: state.v_batt.load(),
            });
        }

        self.previous_mode = mode;
        self.control_loops += 1;
        state.control_loops.store(self.control_loops, std::sync::atomic::Ordering::Relaxed);
    }

    fn reset_controllers(&mut self) {
        self.droll_err_integrator = 0.0;
        self.dpitch_err_integrator = 0.0;
        self.yaw_err_integrator = 0.0;
        self.roll_ctrl.zero();
        self.pitch_ctrl.zero();
        self.yaw_ctrl.zero();
    }

    fn apply_pending_config(&mut self) {
        if let Ok(mut slot) = self.shared.pending_config.lock() {
            if let Some(config) = slot.take() {
                self.estimator =
                    AttitudeEstimator::new(config.imu_roll_trim, config.imu_pitch_trim);
                let (roll, pitch, yaw) = synthesize_filters(&config);
                self.roll_ctrl = roll;
                self.pitch_ctrl = pitch;
                self.yaw_ctrl = yaw;
                self.config = config;
            }
        }
    }
}

fn synthesize_filters(config: &CoreConfig) -> (PidFilter, PidFilter, PidFilter) {
    (
        PidFilter::new(
            config.roll_rate.kp,
            config.roll_rate.ki,
            config.roll_rate.kd,
            PID_TAU,
            DT,
        ),
        PidFilter::new(
            config.pitch_rate.kp,
            config.pitch_rate.ki,
            config.pitch_rate.kd,
            PID_TAU,
            DT,
        ),
        PidFilter::new(config.yaw.kp, config.yaw.ki, config.yaw.kd, PID_TAU, DT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::sync::Mutex;

    /// Records every pulse for inspection.
    struct RecordingActuator {
        pulses: Mutex<Vec<(u8, f32)>>,
    }

    impl RecordingActuator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pulses: Mutex::new(Vec::new()),
            })
        }

        fn last_frame(&self) -> Vec<(u8, f32)> {
            let pulses = self.pulses.lock().unwrap();
            pulses[pulses.len().saturating_sub(4)..].to_vec()
        }
    }

    impl ActuatorDriver for RecordingActuator {
        fn send_pulse_normalized(&self, channel: u8, value: f32) {
            self.pulses.lock().unwrap().push((channel, value));
        }
    }

    fn level_sample() -> ImuSample {
        ImuSample {
            euler: Vector3::zeros(),
            gyro_raw: Vector3::new(0, 0, 0),
        }
    }

    fn core_with_actuator() -> (FlightCore, Arc<SharedState>, Arc<RecordingActuator>) {
        let shared = Arc::new(SharedState::default());
        let actuator = RecordingActuator::new();
        let core = FlightCore::new(
            shared.clone(),
            actuator.clone(),
            None,
            CoreConfig::default(),
        );
        (core, shared, actuator)
    }

    #[test]
    fn test_disarmed_tick_keeps_everything_zero() {
        let (mut core, shared, actuator) = core_with_actuator();
        shared.setpoint.throttle.store(0.8);
        shared.setpoint.yaw.store(1.0);

        core.tick(&level_sample());

        assert_eq!(shared.state.esc_out_snapshot(), [0.0; 4]);
        assert_eq!(shared.setpoint.yaw.load(), 0.0);
        assert_eq!(shared.state.droll_err_integrator.load(), 0.0);
        assert!(actuator.pulses.lock().unwrap().is_empty());
        assert_eq!(shared.state.control_loops.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_first_armed_tick_emits_minimum_pulses() {
        let (mut core, shared, actuator) = core_with_actuator();
        core.tick(&level_sample());

        shared.setpoint.arm(CoreMode::Attitude);
        shared.setpoint.throttle.store(0.5);
        core.tick(&level_sample());

        assert_eq!(
            actuator.last_frame(),
            vec![(1, 0.0), (2, 0.0), (3, 0.0), (4, 0.0)]
        );

        // Second armed tick carries real throttle compensation.
        core.tick(&level_sample());
        let frame = actuator.last_frame();
        for (_, value) in frame {
            assert!(value > 0.0 && value <= 1.0);
        }
    }

    #[test]
    fn test_esc_outputs_stay_in_unit_range() {
        let (mut core, shared, _actuator) = core_with_actuator();
        shared.setpoint.arm(CoreMode::Attitude);
        shared.setpoint.throttle.store(1.0);
        shared.setpoint.roll.store(0.4);
        shared.setpoint.pitch.store(-0.4);

        let tilted = ImuSample {
            euler: Vector3::new(0.5, -0.5, 0.2),
            gyro_raw: Vector3::new(2000, -1500, 800),
        };
        for _ in 0..50 {
            core.tick(&tilted);
        }
        let esc = shared.state.esc_out_snapshot();
        for m in esc {
            assert!((0.0..=1.0).contains(&m), "esc out of range: {esc:?}");
        }
    }

    #[test]
    fn test_yaw_setpoint_frozen_below_cutoff() {
        let (mut core, shared, _actuator) = core_with_actuator();
        shared.setpoint.arm(CoreMode::Attitude);
        shared.setpoint.throttle.store(0.05);
        shared.setpoint.yaw_rate.store(2.0);

        for _ in 0..200 {
            core.tick(&level_sample());
        }
        assert_eq!(shared.setpoint.yaw.load(), 0.0);

        shared.setpoint.throttle.store(0.5);
        for _ in 0..200 {
            core.tick(&level_sample());
        }
        assert_relative_eq!(shared.setpoint.yaw.load(), 2.0 * DT * 200.0, epsilon = 1e-3);
    }

    #[test]
    fn test_integrators_gated_by_thrust_component() {
        let (mut core, shared, _actuator) = core_with_actuator();
        shared.setpoint.arm(CoreMode::Attitude);

        // Low throttle: u0 stays under the cutoff, integrators hold at zero
        // despite a persistent rate error.
        shared.setpoint.throttle.store(0.1);
        let rolling = ImuSample {
            euler: Vector3::zeros(),
            gyro_raw: Vector3::new(0, 1000, 0),
        };
        for _ in 0..100 {
            core.tick(&rolling);
        }
        assert_eq!(shared.state.droll_err_integrator.load(), 0.0);

        // High throttle: accumulation begins.
        shared.setpoint.throttle.store(0.8);
        for _ in 0..100 {
            core.tick(&rolling);
        }
        assert!(shared.state.droll_err_integrator.load().abs() > 0.0);
    }

    #[test]
    fn test_land_saturation_while_grounded() {
        let (mut core, shared, _actuator) = core_with_actuator();
        shared.setpoint.arm(CoreMode::Attitude);
        shared.setpoint.throttle.store(0.05);

        // A hard continuous roll disturbance; grounded saturation pins the
        // roll component to the landing band.
        let disturbed = ImuSample {
            euler: Vector3::zeros(),
            gyro_raw: Vector3::new(0, 8000, 0),
        };
        for _ in 0..100 {
            core.tick(&disturbed);
        }
        let u = shared.state.control_u_snapshot();
        assert!(u[1].abs() <= LAND_SATURATION + 1e-6);
    }

    #[test]
    fn test_double_disarm_indistinguishable_from_one() {
        let (mut core, shared, _actuator) = core_with_actuator();
        shared.setpoint.arm(CoreMode::Attitude);
        shared.setpoint.throttle.store(0.5);
        for _ in 0..10 {
            core.tick(&level_sample());
        }

        shared.disarm();
        core.tick(&level_sample());
        let esc_once = shared.state.esc_out_snapshot();
        let loops_once = shared.state.control_loops.load(std::sync::atomic::Ordering::Relaxed);

        shared.disarm();
        core.tick(&level_sample());
        assert_eq!(shared.state.esc_out_snapshot(), esc_once);
        assert_eq!(
            shared.state.control_loops.load(std::sync::atomic::Ordering::Relaxed),
            loops_once
        );
        assert_eq!(esc_once, [0.0; 4]);
    }
}
