//! Controller configuration, persisted between flights and reloaded on
//! every arm so gains can be edited while sitting disarmed.

use serde::{Deserialize, Serialize};

/// Gains for one discrete PID filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Everything the flight core needs to synthesize its controllers plus the
/// stick scaling used by the flight stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Roll angular-rate controller gains.
    pub roll_rate: PidGains,
    /// Pitch angular-rate controller gains.
    pub pitch_rate: PidGains,
    /// Yaw angle controller gains.
    pub yaw: PidGains,

    /// Thrust component commanded at zero throttle stick, keeps armed
    /// propellers turning.
    pub idle_throttle: f32,

    /// Full roll stick deflection maps to this angle setpoint (rad).
    pub max_roll_setpoint: f32,
    /// Full pitch stick deflection maps to this angle setpoint (rad).
    pub max_pitch_setpoint: f32,
    /// Full yaw stick deflection maps to this rate setpoint (rad/s).
    pub max_yaw_rate: f32,

    /// Outer-loop conversion from roll angle error to rate setpoint.
    pub roll_rate_per_rad: f32,
    /// Outer-loop conversion from pitch angle error to rate setpoint.
    pub pitch_rate_per_rad: f32,

    /// Mounting trim subtracted from the fused Euler roll axis (rad).
    pub imu_roll_trim: f32,
    /// Mounting trim subtracted from the fused Euler pitch axis (rad).
    pub imu_pitch_trim: f32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            roll_rate: PidGains {
                kp: 0.12,
                ki: 0.4,
                kd: 0.002,
            },
            pitch_rate: PidGains {
                kp: 0.12,
                ki: 0.4,
                kd: 0.002,
            },
            yaw: PidGains {
                kp: 0.4,
                ki: 0.2,
                kd: 0.02,
            },
            idle_throttle: 0.1,
            max_roll_setpoint: 0.4,
            max_pitch_setpoint: 0.4,
            max_yaw_rate: 2.0,
            roll_rate_per_rad: 4.0,
            pitch_rate_per_rad: 4.0,
            imu_roll_trim: 0.0,
            imu_pitch_trim: 0.0,
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, g) in [
            ("roll_rate", &self.roll_rate),
            ("pitch_rate", &self.pitch_rate),
            ("yaw", &self.yaw),
        ] {
            if g.kp < 0.0 || g.ki < 0.0 || g.kd < 0.0 {
                return Err(format!("{name} gains must be non-negative"));
            }
        }
        if !(0.0..0.5).contains(&self.idle_throttle) {
            return Err("idle_throttle must be in [0, 0.5)".to_string());
        }
        if self.max_roll_setpoint <= 0.0 || self.max_pitch_setpoint <= 0.0 {
            return Err("max roll/pitch setpoints must be positive".to_string());
        }
        if self.max_yaw_rate <= 0.0 {
            return Err("max_yaw_rate must be positive".to_string());
        }
        if self.roll_rate_per_rad <= 0.0 || self.pitch_rate_per_rad <= 0.0 {
            return Err("rate-per-rad gains must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_gain_invalid() {
        let mut c = CoreConfig::default();
        c.roll_rate.kp = -0.1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_idle_throttle_range() {
        let mut c = CoreConfig::default();
        c.idle_throttle = 0.6;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_round_trips_through_json() {
        let c = CoreConfig::default();
        let text = serde_json::to_string(&c).unwrap();
        let back: CoreConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, c);
    }
}
