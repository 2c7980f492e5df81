// High-level chassis driver for the two-wheel base and camera pan servo
//
// Every drive command is open-loop and timed: set both wheel throttles, hold for
// the requested time, then unconditionally stop and wait for the base to settle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::board::{BoardError, ServoBoard};
use super::calibration::{CalibrationTable, CorrectionPair, Motion, SpeedLevel, WheelThrottles};
use crate::command::{ChassisCommand, SERVO_CENTER_DEG};
use crate::config::{ChassisConfig, ConfigError};

/// Camera pan limit either side of centre (degrees)
pub const CAMERA_LIMIT_DEG: f64 = 90.0;

/// How often an abortable hold checks its flag
const ABORT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum ChassisError {
    #[error("Speed level {requested} is not calibrated (known levels: {known:?})")]
    InvalidSpeedLevel {
        requested: SpeedLevel,
        known: Vec<SpeedLevel>,
    },

    #[error("Camera angle {requested} is outside [-90, 90] (current angle {current})")]
    CameraAngleOutOfRange { current: f64, requested: f64 },

    #[error("Servo board error: {0}")]
    Board(#[from] BoardError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ChassisError {
    /// Rejected user input: state is unchanged and the caller may carry on.
    /// Anything else is a hardware or setup fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChassisError::InvalidSpeedLevel { .. } | ChassisError::CameraAngleOutOfRange { .. }
        )
    }
}

/// Convert caller-supplied seconds to a hold; non-positive or malformed values hold for zero
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

/// Motion controller owning the servo board
pub struct ChassisDriver<B: ServoBoard> {
    board: B,
    calibration: CalibrationTable,

    left_channel: u8,
    right_channel: u8,
    camera_channel: u8,

    speed_level: SpeedLevel,
    correction: CorrectionPair,
    camera_angle: f64,

    default_hold: Duration,
    hold_latency: Duration,
    camera_step: f64,

    abort: Option<Arc<AtomicBool>>,
    park_on_drop: bool,
}

impl<B: ServoBoard> ChassisDriver<B> {
    /// Take ownership of the board and point the camera straight ahead
    pub fn new(board: B, config: &ChassisConfig) -> Result<Self, ChassisError> {
        config.validate()?;

        let calibration = config.speed_levels.clone();
        let (speed_level, correction) = calibration
            .lowest_level()
            .and_then(|level| calibration.lookup(level).map(|pair| (level, pair)))
            .ok_or_else(|| ConfigError::Invalid("calibration table has no speed levels".into()))?;

        let mut driver = Self {
            board,
            calibration,
            left_channel: config.left_channel,
            right_channel: config.right_channel,
            camera_channel: config.camera_channel,
            speed_level,
            correction,
            camera_angle: 0.0,
            default_hold: secs_to_duration(config.default_hold_secs),
            hold_latency: secs_to_duration(config.hold_latency_secs),
            camera_step: config.camera_step_deg,
            abort: None,
            park_on_drop: true,
        };

        info!(
            "Chassis ready: speed level {}, channels left={} right={} camera={}",
            driver.speed_level, driver.left_channel, driver.right_channel, driver.camera_channel
        );
        driver.set_camera_angle(0.0)?;
        Ok(driver)
    }

    /// Share an abort flag; a set flag cuts the current hold short.
    /// The stop and settle that follow a hold always run.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Whether dropping the driver stops the wheels and centres the camera (on by default)
    pub fn set_park_on_drop(&mut self, park: bool) {
        self.park_on_drop = park;
    }

    pub fn speed_level(&self) -> SpeedLevel {
        self.speed_level
    }

    pub fn camera_angle(&self) -> f64 {
        self.camera_angle
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn set_default_hold(&mut self, secs: f64) {
        self.default_hold = secs_to_duration(secs);
    }

    pub fn set_hold_latency(&mut self, secs: f64) {
        self.hold_latency = secs_to_duration(secs);
    }

    pub fn set_camera_step(&mut self, degrees: f64) {
        self.camera_step = degrees;
    }

    /// Select a calibrated speed level; unknown levels leave the current one in place
    pub fn set_speed(&mut self, level: SpeedLevel) -> Result<(), ChassisError> {
        match self.calibration.lookup(level) {
            Some(pair) => {
                info!("Speed level {} (left={}, right={})", level, pair.left, pair.right);
                self.speed_level = level;
                self.correction = pair;
                Ok(())
            }
            None => {
                let known: Vec<SpeedLevel> = self.calibration.levels().collect();
                warn!(
                    "Speed level {} is not calibrated, keeping level {} (known: {:?})",
                    level, self.speed_level, known
                );
                Err(ChassisError::InvalidSpeedLevel {
                    requested: level,
                    known,
                })
            }
        }
    }

    /// Drive forward for `secs` (default hold if `None`), then stop
    pub fn forward(&mut self, secs: Option<f64>) -> Result<(), ChassisError> {
        self.drive(Motion::Forward, secs)
    }

    /// Drive backward for `secs` (default hold if `None`), then stop
    pub fn reverse(&mut self, secs: Option<f64>) -> Result<(), ChassisError> {
        self.drive(Motion::Reverse, secs)
    }

    /// Spin the base in place, then stop
    pub fn yaw(&mut self, clockwise: bool, secs: Option<f64>) -> Result<(), ChassisError> {
        self.drive(Motion::yaw(clockwise), secs)
    }

    fn drive(&mut self, motion: Motion, secs: Option<f64>) -> Result<(), ChassisError> {
        let hold = secs.map_or(self.default_hold, secs_to_duration);
        let throttles = motion.throttles(self.correction);

        info!(
            "{:?} at speed {} for {:.2}s: left={:.3}, right={:.3}",
            motion,
            self.speed_level,
            hold.as_secs_f64(),
            throttles.left,
            throttles.right
        );

        let applied = self.set_wheel_throttles(throttles);
        if applied.is_ok() {
            self.hold(hold);
        }

        // The stop runs even when applying the throttles failed
        let stopped = self.all_stop();
        applied?;
        stopped
    }

    fn set_wheel_throttles(&mut self, throttles: WheelThrottles) -> Result<(), BoardError> {
        self.board.set_throttle(self.left_channel, throttles.left)?;
        self.board.set_throttle(self.right_channel, throttles.right)
    }

    fn stop_wheels(&mut self) -> Result<(), BoardError> {
        let stop = WheelThrottles::zero();
        let left = self.board.set_throttle(self.left_channel, stop.left);
        let right = self.board.set_throttle(self.right_channel, stop.right);
        left.and(right)
    }

    fn hold(&self, duration: Duration) {
        let Some(flag) = &self.abort else {
            sleep(duration);
            return;
        };

        let deadline = Instant::now() + duration;
        loop {
            if flag.load(Ordering::Relaxed) {
                info!("Hold aborted");
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            sleep((deadline - now).min(ABORT_POLL));
        }
    }

    /// Stop both wheels, then wait out the settle latency
    pub fn all_stop(&mut self) -> Result<(), ChassisError> {
        debug!("All stop");
        let stopped = self.stop_wheels();
        sleep(self.hold_latency);
        Ok(stopped?)
    }

    /// Point the camera at an absolute angle: negative = right, positive = left
    pub fn set_camera_angle(&mut self, degrees: f64) -> Result<(), ChassisError> {
        if !(-CAMERA_LIMIT_DEG..=CAMERA_LIMIT_DEG).contains(&degrees) {
            warn!(
                "Current angle: {}, new angle {} out of range, ignoring request",
                self.camera_angle, degrees
            );
            return Err(ChassisError::CameraAngleOutOfRange {
                current: self.camera_angle,
                requested: degrees,
            });
        }

        // Servo 90° is chassis-forward
        self.board
            .set_angle(self.camera_channel, degrees + SERVO_CENTER_DEG)?;
        self.camera_angle = degrees;
        debug!("Camera angle {}", degrees);
        Ok(())
    }

    /// Pan the camera by an increment (camera step if `None`).
    ///
    /// Clockwise decreases the angle. `reset` centres the camera and ignores the
    /// other arguments. Out-of-range targets are rejected, never clamped.
    pub fn yaw_camera(
        &mut self,
        clockwise: bool,
        increment: Option<f64>,
        reset: bool,
    ) -> Result<(), ChassisError> {
        if reset {
            return self.set_camera_angle(0.0);
        }

        let increment = increment.unwrap_or(self.camera_step);
        let target = if clockwise {
            self.camera_angle - increment
        } else {
            self.camera_angle + increment
        };

        let result = self.set_camera_angle(target);
        sleep(self.hold_latency);
        result
    }

    /// Run a parsed command
    pub fn execute(&mut self, command: &ChassisCommand) -> Result<(), ChassisError> {
        match *command {
            ChassisCommand::SetSpeed { level } => self.set_speed(level),
            ChassisCommand::Forward { secs } => self.forward(secs),
            ChassisCommand::Reverse { secs } => self.reverse(secs),
            ChassisCommand::Yaw { clockwise, secs } => self.yaw(clockwise, secs),
            ChassisCommand::CameraAngle { degrees } => self.set_camera_angle(degrees),
            ChassisCommand::PanCamera {
                clockwise,
                increment,
            } => self.yaw_camera(clockwise, increment, false),
            ChassisCommand::ResetCamera => self.yaw_camera(true, None, true),
            ChassisCommand::Stop => self.all_stop(),
        }
    }

    /// Stop the wheels and centre the camera
    pub fn park(&mut self) -> Result<(), ChassisError> {
        info!("Parking chassis");
        let stopped = self.stop_wheels();
        let centred = self.set_camera_angle(0.0);
        stopped?;
        centred
    }
}

impl<B: ServoBoard> Drop for ChassisDriver<B> {
    fn drop(&mut self) {
        if !self.park_on_drop {
            return;
        }
        // Try to leave the bot stopped and looking ahead
        if let Err(e) = self.park() {
            warn!("Failed to park chassis on drop: {}", e);
        }
    }
}
