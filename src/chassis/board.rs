// Servo board abstraction
//
// The driver only needs two things from the hardware: a throttle setter for the
// continuous-rotation drive servos and an absolute angle setter for the pan servo.

use tracing::{debug, info};

use super::pca9685::{Pca9685, Pca9685Error};
use crate::config::ChassisConfig;

/// Standard servo travel (degrees)
pub const ANGLE_RANGE_DEG: f64 = 180.0;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("PWM controller error: {0}")]
    Pca9685(#[from] Pca9685Error),

    #[error("Throttle {value} on channel {channel} outside [-1, 1]")]
    ThrottleOutOfRange { channel: u8, value: f64 },

    #[error("Angle {degrees} on channel {channel} outside [0, 180]")]
    AngleOutOfRange { channel: u8, degrees: f64 },
}

/// Servo outputs of a PWM board
pub trait ServoBoard {
    /// Set a continuous-rotation servo's speed/direction, 0 = stop
    fn set_throttle(&mut self, channel: u8, value: f64) -> Result<(), BoardError>;

    /// Set a standard servo's absolute angle
    fn set_angle(&mut self, channel: u8, degrees: f64) -> Result<(), BoardError>;
}

impl<B: ServoBoard + ?Sized> ServoBoard for Box<B> {
    fn set_throttle(&mut self, channel: u8, value: f64) -> Result<(), BoardError> {
        (**self).set_throttle(channel, value)
    }

    fn set_angle(&mut self, channel: u8, degrees: f64) -> Result<(), BoardError> {
        (**self).set_angle(channel, degrees)
    }
}

impl<B: ServoBoard + ?Sized> ServoBoard for &mut B {
    fn set_throttle(&mut self, channel: u8, value: f64) -> Result<(), BoardError> {
        (**self).set_throttle(channel, value)
    }

    fn set_angle(&mut self, channel: u8, degrees: f64) -> Result<(), BoardError> {
        (**self).set_angle(channel, degrees)
    }
}

fn check_throttle(channel: u8, value: f64) -> Result<(), BoardError> {
    if (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(BoardError::ThrottleOutOfRange { channel, value })
    }
}

fn check_angle(channel: u8, degrees: f64) -> Result<(), BoardError> {
    if (0.0..=ANGLE_RANGE_DEG).contains(&degrees) {
        Ok(())
    } else {
        Err(BoardError::AngleOutOfRange { channel, degrees })
    }
}

/// Pulse width for a throttle: -1 -> min, 0 -> centre, +1 -> max
pub fn throttle_to_pulse_us(value: f64, [min_us, max_us]: [f64; 2]) -> f64 {
    min_us + (max_us - min_us) * (value + 1.0) / 2.0
}

/// Pulse width for an angle: 0° -> min, 180° -> max
pub fn angle_to_pulse_us(degrees: f64, [min_us, max_us]: [f64; 2]) -> f64 {
    min_us + (max_us - min_us) * (degrees / ANGLE_RANGE_DEG)
}

/// Servo board backed by a PCA9685
pub struct Pca9685Board {
    chip: Pca9685,
    throttle_pulse_us: [f64; 2],
    angle_pulse_us: [f64; 2],
}

impl Pca9685Board {
    /// Open the PCA9685 described by the config
    pub fn open(config: &ChassisConfig) -> Result<Self, BoardError> {
        info!(
            "Opening PCA9685 on I2C bus {} at 0x{:02X} ({} Hz)",
            config.i2c_bus, config.pca9685_address, config.pwm_frequency_hz
        );
        let chip = Pca9685::open(
            config.i2c_bus,
            config.pca9685_address,
            config.pwm_frequency_hz,
        )?;
        Ok(Self {
            chip,
            throttle_pulse_us: config.throttle_pulse_us,
            angle_pulse_us: config.angle_pulse_us,
        })
    }
}

impl ServoBoard for Pca9685Board {
    fn set_throttle(&mut self, channel: u8, value: f64) -> Result<(), BoardError> {
        check_throttle(channel, value)?;
        let us = throttle_to_pulse_us(value, self.throttle_pulse_us);
        self.chip.set_pulse_us(channel, us)?;
        Ok(())
    }

    fn set_angle(&mut self, channel: u8, degrees: f64) -> Result<(), BoardError> {
        check_angle(channel, degrees)?;
        let us = angle_to_pulse_us(degrees, self.angle_pulse_us);
        self.chip.set_pulse_us(channel, us)?;
        Ok(())
    }
}

/// One write issued to a `SimBoard`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoardWrite {
    Throttle { channel: u8, value: f64 },
    Angle { channel: u8, degrees: f64 },
}

/// In-memory board for simulation and tests: validates and logs every write.
/// Writes are kept only when recording is on.
#[derive(Debug)]
pub struct SimBoard {
    writes: Vec<BoardWrite>,
    record: bool,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    /// Board that records every write
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            record: true,
        }
    }

    /// Board that only logs, for long-running simulation
    pub fn log_only() -> Self {
        Self {
            writes: Vec::new(),
            record: false,
        }
    }

    fn push(&mut self, write: BoardWrite) {
        if self.record {
            self.writes.push(write);
        }
    }

    /// All writes in the order they were issued
    pub fn writes(&self) -> &[BoardWrite] {
        &self.writes
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }

    /// Last throttle written to a channel
    pub fn throttle(&self, channel: u8) -> Option<f64> {
        self.writes.iter().rev().find_map(|w| match *w {
            BoardWrite::Throttle { channel: ch, value } if ch == channel => Some(value),
            _ => None,
        })
    }

    /// Last angle written to a channel
    pub fn angle(&self, channel: u8) -> Option<f64> {
        self.writes.iter().rev().find_map(|w| match *w {
            BoardWrite::Angle { channel: ch, degrees } if ch == channel => Some(degrees),
            _ => None,
        })
    }
}

impl ServoBoard for SimBoard {
    fn set_throttle(&mut self, channel: u8, value: f64) -> Result<(), BoardError> {
        check_throttle(channel, value)?;
        debug!("[sim] ch{} throttle={:.3}", channel, value);
        self.push(BoardWrite::Throttle { channel, value });
        Ok(())
    }

    fn set_angle(&mut self, channel: u8, degrees: f64) -> Result<(), BoardError> {
        check_angle(channel, degrees)?;
        debug!("[sim] ch{} angle={:.1}", channel, degrees);
        self.push(BoardWrite::Angle { channel, degrees });
        Ok(())
    }
}
