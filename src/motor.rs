use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest raw position of a 12-bit STS3215 encoder.
pub const MAX_TICK: i32 = 4095;

/// Raw position at the middle of a full turn; the homing reference.
pub const HALF_TURN_TICK: i32 = 2047;

/// How raw ticks are presented to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormMode {
    /// Signed degrees around the middle of the calibrated range.
    Degrees,
    /// Signed percent of the calibrated range, -100..=100.
    RangeM100_100,
    /// Unsigned percent of the calibrated range, 0..=100.
    Range0_100,
}

/// Identity of one servo on a bus. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motor {
    pub id: u8,
    pub model: String,
    pub norm_mode: NormMode,
}

impl Motor {
    pub fn new(id: u8, model: &str, norm_mode: NormMode) -> Self {
        Self {
            id,
            model: model.to_string(),
            norm_mode,
        }
    }

    pub fn sts3215(id: u8, norm_mode: NormMode) -> Self {
        Self::new(id, "sts3215", norm_mode)
    }
}

/// Persisted calibration of a single motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCalibration {
    pub id: u8,
    pub drive_mode: u8,
    pub homing_offset: i32,
    pub range_min: i32,
    pub range_max: i32,
}

impl MotorCalibration {
    /// Factory state: no homing bias, full encoder travel.
    pub fn uncalibrated(id: u8) -> Self {
        Self {
            id,
            drive_mode: 0,
            homing_offset: 0,
            range_min: 0,
            range_max: MAX_TICK,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.range_min < self.range_max
    }

    pub fn mid(&self) -> f64 {
        (self.range_min + self.range_max) as f64 / 2.0
    }

    pub fn span(&self) -> f64 {
        (self.range_max - self.range_min) as f64
    }
}

/// Calibration records of one controller, keyed by motor name.
pub type CalibrationSet = BTreeMap<String, MotorCalibration>;
