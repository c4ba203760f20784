//! A minimal attitude plant flown through the real driver contracts.
//!
//! The vehicle is deliberately small: first-order torque response per axis
//! with rate damping, Euler-integrated at the control timestep. It exists to
//! close the loop around the autopilot, not to predict a real airframe.
//!
//! One `SimVehicle` plays both the IMU and the ESC bank: the actuator side
//! records normalized pulses, the IMU side steps the dynamics once per
//! sample period and reports the state back through the same sensor
//! conventions the estimator undoes (inverted Euler Y, raw gyro words,
//! yaw wrapped into (-pi, pi]).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use yarrow_core::estimator::GYRO_FSR_DPS;
use yarrow_core::{ImuSample, DT};
use yarrow_flight::{ActuatorDriver, ImuDriver, ImuEvent};

/// Steps without a pulse after which a simulated ESC cuts its motor, the
/// way real ESCs fail safe when pulses stop.
const ESC_PULSE_WATCHDOG_STEPS: u32 = 20;

/// Parameters of the simulated airframe and its sensors.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Wall-clock spacing of IMU samples. Zero runs the plant as fast as
    /// the control loop can consume it (accelerated tests).
    pub sample_period: Duration,
    /// Stop after this many samples; `None` runs until stopped.
    pub max_ticks: Option<u64>,
    /// Body torque response per unit of control component (rad/s^2).
    pub torque_gain: f32,
    /// Aerodynamic rate damping (1/s).
    pub rate_damping: f32,
    /// Standard deviation of gyro noise in raw counts, with a fixed seed.
    pub gyro_noise_counts: f32,
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            sample_period: Duration::ZERO,
            max_ticks: None,
            torque_gain: 40.0,
            rate_damping: 2.0,
            gyro_noise_counts: 0.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Default)]
struct PlantState {
    roll: f32,
    pitch: f32,
    yaw: f32,
    droll: f32,
    dpitch: f32,
    dyaw: f32,
    motors: [f32; 4],
    /// Steps since each channel last saw a pulse.
    stale: [u32; 4],
}

pub struct SimVehicle {
    params: SimParams,
    plant: Mutex<PlantState>,
    rng: Mutex<StdRng>,
    stopped: AtomicBool,
    ticks: AtomicU64,
    /// Wakes the IMU waiter early on stop.
    stop_signal: (Mutex<bool>, Condvar),
}

impl SimVehicle {
    pub fn new(params: SimParams) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(params.seed)),
            params,
            plant: Mutex::new(PlantState::default()),
            stopped: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            stop_signal: (Mutex::new(false), Condvar::new()),
        }
    }

    /// Knock the airframe over; the next samples report the tipped angle.
    pub fn tip_over(&self, roll: f32) {
        let mut plant = self.plant.lock().unwrap();
        plant.roll = roll;
    }

    pub fn attitude(&self) -> (f32, f32, f32) {
        let plant = self.plant.lock().unwrap();
        (plant.roll, plant.pitch, plant.yaw)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Advance the dynamics one control timestep and read the sensors.
    fn step(&self) -> ImuSample {
        let mut plant = self.plant.lock().unwrap();

        // ESC watchdog: channels that stopped receiving pulses wind down.
        for i in 0..4 {
            plant.stale[i] = plant.stale[i].saturating_add(1);
            if plant.stale[i] > ESC_PULSE_WATCHDOG_STEPS {
                plant.motors[i] = 0.0;
            }
        }

        // Recover the control components from the motor mix.
        let m = plant.motors;
        let u_roll = (-m[0] + m[1] + m[2] - m[3]) / 4.0;
        let u_pitch = (m[0] - m[1] + m[2] - m[3]) / 4.0;
        let u_yaw = (-m[0] - m[1] + m[2] + m[3]) / 4.0;

        let g = self.params.torque_gain;
        let d = self.params.rate_damping;
        plant.droll += (g * u_roll - d * plant.droll) * DT;
        plant.dpitch += (g * u_pitch - d * plant.dpitch) * DT;
        plant.dyaw += (g * u_yaw - d * plant.dyaw) * DT;
        plant.roll += plant.droll * DT;
        plant.pitch += plant.dpitch * DT;
        plant.yaw += plant.dyaw * DT;

        // Report through the same conventions the estimator undoes.
        let euler = Vector3::new(plant.pitch, -plant.roll, wrap_pi(-plant.yaw));
        let counts_per_rad_s = 32767.0 / GYRO_FSR_DPS.to_radians();
        let mut gyro = [
            plant.dpitch * counts_per_rad_s,
            plant.droll * counts_per_rad_s,
            plant.dyaw * counts_per_rad_s,
        ];
        if self.params.gyro_noise_counts > 0.0 {
            let mut rng = self.rng.lock().unwrap();
            let noise = Normal::new(0.0, self.params.gyro_noise_counts).unwrap();
            for word in &mut gyro {
                *word += noise.sample(&mut *rng);
            }
        }

        ImuSample {
            euler,
            gyro_raw: Vector3::new(
                clamp_i16(gyro[0]),
                clamp_i16(gyro[1]),
                clamp_i16(gyro[2]),
            ),
        }
    }
}

impl ImuDriver for SimVehicle {
    fn next_event(&self) -> ImuEvent {
        if self.stopped.load(Ordering::SeqCst) {
            return ImuEvent::Stopped;
        }
        if let Some(max) = self.params.max_ticks {
            if self.ticks.load(Ordering::SeqCst) >= max {
                return ImuEvent::Stopped;
            }
        }

        if !self.params.sample_period.is_zero() {
            let (lock, cvar) = &self.stop_signal;
            let guard = lock.lock().unwrap();
            let (_guard, _timeout) = cvar
                .wait_timeout_while(guard, self.params.sample_period, |stopped| !*stopped)
                .unwrap();
            if self.stopped.load(Ordering::SeqCst) {
                return ImuEvent::Stopped;
            }
        }

        self.ticks.fetch_add(1, Ordering::SeqCst);
        ImuEvent::Sample(self.step())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let (lock, cvar) = &self.stop_signal;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl ActuatorDriver for SimVehicle {
    fn send_pulse_normalized(&self, channel: u8, value: f32) {
        if !(1..=4).contains(&channel) {
            return;
        }
        let mut plant = self.plant.lock().unwrap();
        let i = channel as usize - 1;
        plant.motors[i] = value.clamp(0.0, 1.0);
        plant.stale[i] = 0;
    }
}

fn wrap_pi(angle: f32) -> f32 {
    let mut a = angle % (2.0 * std::f32::consts::PI);
    if a > std::f32::consts::PI {
        a -= 2.0 * std::f32::consts::PI;
    } else if a <= -std::f32::consts::PI {
        a += 2.0 * std::f32::consts::PI;
    }
    a
}

fn clamp_i16(value: f32) -> i16 {
    value.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}
