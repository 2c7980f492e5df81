// Chassis control for the two-wheel base and pan camera
//
// Provides:
// - Speed-level calibration table and motion -> throttle mapping
// - PCA9685 PWM controller over I2C
// - Servo board abstraction (hardware and simulated)
// - High-level timed motion driver

pub mod board;
pub mod calibration;
mod driver;
pub mod pca9685;

pub use board::{BoardError, BoardWrite, Pca9685Board, ServoBoard, SimBoard};
pub use calibration::{CalibrationTable, CorrectionPair, Motion, SpeedLevel, WheelThrottles};
pub use driver::{CAMERA_LIMIT_DEG, ChassisDriver, ChassisError};
pub use pca9685::{Pca9685, Pca9685Error};
