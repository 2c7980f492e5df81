// Channel layout, timings, pulse ranges and the optional JSON config file
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chassis::CalibrationTable;

// PCA9685 servo HAT on the Pi's I2C bus
pub const I2C_BUS: u8 = 1;
pub const PCA9685_ADDRESS: u16 = 0x40;
pub const PWM_FREQUENCY_HZ: f64 = 50.0;

// Channel assignment on the servo HAT
pub const LEFT_CHANNEL: u8 = 0; // continuous rotation
pub const RIGHT_CHANNEL: u8 = 1; // continuous rotation
pub const CAMERA_CHANNEL: u8 = 2; // standard servo

// Pulse ranges (microseconds). These depend on the make of servo.
pub const THROTTLE_MIN_PULSE_US: f64 = 750.0;
pub const THROTTLE_MAX_PULSE_US: f64 = 2250.0;
pub const ANGLE_MIN_PULSE_US: f64 = 500.0;
pub const ANGLE_MAX_PULSE_US: f64 = 2500.0;

// Motion timing (seconds)
pub const DEFAULT_HOLD_SECS: f64 = 1.0; // drive time when the caller gives none
pub const HOLD_LATENCY_SECS: f64 = 1.0; // settle time after every stop
pub const CAMERA_STEP_DEG: f64 = 10.0;

// Daemon polling
pub const DAEMON_POLL: Duration = Duration::from_millis(100);
pub const DAEMON_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Runtime configuration, every field optional in the JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub i2c_bus: u8,
    pub pca9685_address: u16,
    pub pwm_frequency_hz: f64,

    pub left_channel: u8,
    pub right_channel: u8,
    pub camera_channel: u8,

    /// [min, max] pulse width for the continuous-rotation drive servos
    pub throttle_pulse_us: [f64; 2],
    /// [min, max] pulse width for the camera pan servo (0° .. 180°)
    pub angle_pulse_us: [f64; 2],

    pub default_hold_secs: f64,
    pub hold_latency_secs: f64,
    pub camera_step_deg: f64,

    pub speed_levels: CalibrationTable,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            i2c_bus: I2C_BUS,
            pca9685_address: PCA9685_ADDRESS,
            pwm_frequency_hz: PWM_FREQUENCY_HZ,
            left_channel: LEFT_CHANNEL,
            right_channel: RIGHT_CHANNEL,
            camera_channel: CAMERA_CHANNEL,
            throttle_pulse_us: [THROTTLE_MIN_PULSE_US, THROTTLE_MAX_PULSE_US],
            angle_pulse_us: [ANGLE_MIN_PULSE_US, ANGLE_MAX_PULSE_US],
            default_hold_secs: DEFAULT_HOLD_SECS,
            hold_latency_secs: HOLD_LATENCY_SECS,
            camera_step_deg: CAMERA_STEP_DEG,
            speed_levels: CalibrationTable::default(),
        }
    }
}

impl ChassisConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.speed_levels.validate().map_err(ConfigError::Invalid)?;

        let channels = [self.left_channel, self.right_channel, self.camera_channel];
        if channels.iter().any(|&ch| ch > 15) {
            return Err(ConfigError::Invalid(format!(
                "channels {:?} must be in 0..=15",
                channels
            )));
        }
        if channels[0] == channels[1] || channels[0] == channels[2] || channels[1] == channels[2] {
            return Err(ConfigError::Invalid(format!(
                "channels {:?} must be distinct",
                channels
            )));
        }

        for (name, [min, max]) in [
            ("throttle_pulse_us", self.throttle_pulse_us),
            ("angle_pulse_us", self.angle_pulse_us),
        ] {
            if !(min >= 0.0 && min < max) {
                return Err(ConfigError::Invalid(format!(
                    "{} must satisfy 0 <= min < max, got [{}, {}]",
                    name, min, max
                )));
            }
        }

        if !(self.pwm_frequency_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pwm_frequency_hz must be positive, got {}",
                self.pwm_frequency_hz
            )));
        }

        for (name, value) in [
            ("default_hold_secs", self.default_hold_secs),
            ("hold_latency_secs", self.hold_latency_secs),
            ("camera_step_deg", self.camera_step_deg),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}
