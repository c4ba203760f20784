//! Attitude estimation from fused IMU output.
//!
//! The IMU driver delivers fused Euler angles plus the raw gyro words once
//! per control tick. This module conditions them into the body-frame angles
//! and rates the controllers run on:
//! - sign correction for the driver's inverted Euler Y axis
//! - configured roll/pitch mounting trims
//! - raw gyro words scaled to rad/s
//! - yaw unwrapped across the +/-pi crossover into a continuous angle

use nalgebra::Vector3;

/// Gyro full-scale range in deg/s, mapped over the i16 raw word.
pub const GYRO_FSR_DPS: f32 = 2000.0;

/// A jump between consecutive yaw samples larger than this is a crossover
/// at +/-pi, not motion (a real frame-to-frame rotation of 6 rad at 200 Hz
/// would be over 1200 rad/s).
const YAW_JUMP_RAD: f32 = 6.0;

const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
const TWO_PI: f32 = 2.0 * core::f32::consts::PI;

/// One IMU sample as produced by the driver: fused Euler angles in radians
/// and the raw signed gyro words.
#[derive(Debug, Clone, Copy)]
pub struct ImuSample {
    pub euler: Vector3<f32>,
    pub gyro_raw: Vector3<i16>,
}

/// Estimated body angles and rates for one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attitude {
    /// Roll angle (rad), positive right per the right hand rule.
    pub roll: f32,
    /// Pitch angle (rad), positive backwards per the right hand rule.
    pub pitch: f32,
    /// Continuous yaw angle (rad) relative to the arming heading.
    pub yaw: f32,
    pub droll: f32,
    pub dpitch: f32,
    pub dyaw: f32,
}

/// Carries the yaw-unwrap state between ticks.
#[derive(Debug, Clone)]
pub struct AttitudeEstimator {
    roll_trim: f32,
    pitch_trim: f32,
    yaw: f32,
    last_yaw: f32,
    num_yaw_spins: i32,
    yaw_origin: f32,
}

impl AttitudeEstimator {
    pub fn new(roll_trim: f32, pitch_trim: f32) -> Self {
        Self {
            roll_trim,
            pitch_trim,
            yaw: 0.0,
            last_yaw: 0.0,
            num_yaw_spins: 0,
            yaw_origin: 0.0,
        }
    }

    /// Latch the raw IMU yaw as the zero heading and reset the spin count.
    /// Called on the first tick after the core leaves DISARMED so yaw is
    /// measured from the takeoff heading.
    pub fn capture_origin(&mut self, sample: &ImuSample) {
        self.num_yaw_spins = 0;
        self.yaw_origin = sample.euler.z;
    }

    /// Condition one sample into angles and rates.
    pub fn update(&mut self, sample: &ImuSample) -> Attitude {
        // The IMU driver reports Euler Y with an inverted sign; fold the
        // correction in together with the mounting trims.
        let roll = -(sample.euler.y - self.roll_trim);
        let pitch = sample.euler.x - self.pitch_trim;

        // Raw gyro matches the sensor coordinate signs, unlike the Euler
        // angles, so no correction here. Roll rate comes from the Y word.
        let scale = GYRO_FSR_DPS * DEG_TO_RAD / 32767.0;
        let droll = f32::from(sample.gyro_raw.y) * scale;
        let dpitch = f32::from(sample.gyro_raw.x) * scale;
        let dyaw = f32::from(sample.gyro_raw.z) * scale;

        // Detect the crossover at Z = +/-pi and fold it into the spin count
        // so yaw stays continuous across full rotations.
        let new_yaw = -(sample.euler.z - self.yaw_origin) + TWO_PI * self.num_yaw_spins as f32;
        if new_yaw - self.last_yaw > YAW_JUMP_RAD {
            self.num_yaw_spins -= 1;
        } else if new_yaw - self.last_yaw < -YAW_JUMP_RAD {
            self.num_yaw_spins += 1;
        }
        self.last_yaw = self.yaw;
        self.yaw = -(sample.euler.z - self.yaw_origin) + TWO_PI * self.num_yaw_spins as f32;

        Attitude {
            roll,
            pitch,
            yaw: self.yaw,
            droll,
            dpitch,
            dyaw,
        }
    }

    pub fn num_yaw_spins(&self) -> i32 {
        self.num_yaw_spins
    }
}
