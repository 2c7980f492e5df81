// Speed-level calibration for the differential base
// Maps a discrete speed level to per-wheel throttle magnitudes, and a motion
// to the signed throttle pair sent to the two drive servos.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Discrete speed level, a key into the calibration table
pub type SpeedLevel = u8;

/// Bench calibration: level -> (left, right) throttle magnitude
const DEFAULT_SPEED_FACTORS: [(SpeedLevel, f64, f64); 3] = [
    (1, 0.034, 0.020),
    (2, 0.066, 0.050),
    (3, 0.110, 0.070),
];

/// Per-wheel throttle magnitudes for one speed level, each in (0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionPair {
    pub left: f64,
    pub right: f64,
}

impl CorrectionPair {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    fn is_valid(&self) -> bool {
        let in_range = |f: f64| f > 0.0 && f <= 1.0;
        in_range(self.left) && in_range(self.right)
    }
}

/// Read-only table of correction pairs keyed by speed level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable {
    levels: BTreeMap<SpeedLevel, CorrectionPair>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        DEFAULT_SPEED_FACTORS
            .iter()
            .map(|&(level, left, right)| (level, CorrectionPair::new(left, right)))
            .collect()
    }
}

impl FromIterator<(SpeedLevel, CorrectionPair)> for CalibrationTable {
    fn from_iter<I: IntoIterator<Item = (SpeedLevel, CorrectionPair)>>(iter: I) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

impl CalibrationTable {
    /// Resolve a speed level, `None` if the level is not calibrated
    pub fn lookup(&self, level: SpeedLevel) -> Option<CorrectionPair> {
        self.levels.get(&level).copied()
    }

    /// Lowest calibrated level (the power-on speed)
    pub fn lowest_level(&self) -> Option<SpeedLevel> {
        self.levels.keys().next().copied()
    }

    /// Calibrated levels in ascending order
    pub fn levels(&self) -> impl Iterator<Item = SpeedLevel> + '_ {
        self.levels.keys().copied()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.levels.is_empty() {
            return Err("calibration table has no speed levels".to_string());
        }
        for (level, pair) in &self.levels {
            if !pair.is_valid() {
                return Err(format!(
                    "speed level {}: correction factors must be in (0, 1], got left={} right={}",
                    level, pair.left, pair.right
                ));
            }
        }
        Ok(())
    }
}

/// Signed throttle commands for the two drive servos, each in [-1, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelThrottles {
    pub left: f64,
    pub right: f64,
}

impl WheelThrottles {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Timed drive motions of the base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Forward,
    Reverse,
    /// Spin in place, both wheels turning the same absolute direction
    YawClockwise,
    YawCounterClockwise,
}

impl Motion {
    pub fn yaw(clockwise: bool) -> Self {
        if clockwise {
            Motion::YawClockwise
        } else {
            Motion::YawCounterClockwise
        }
    }

    /// Throttle pair for this motion at the given calibration.
    ///
    /// The wheels are mirror-mounted: equal-sign throttle spins the base,
    /// opposite-sign throttle drives it straight.
    pub fn throttles(self, pair: CorrectionPair) -> WheelThrottles {
        let CorrectionPair { left, right } = pair;
        match self {
            Motion::Forward => WheelThrottles::new(left, -right),
            Motion::Reverse => WheelThrottles::new(-left, right),
            Motion::YawClockwise => WheelThrottles::new(left, right),
            Motion::YawCounterClockwise => WheelThrottles::new(-left, -right),
        }
    }
}
