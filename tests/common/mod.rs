#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use umbra_arm::calibration::CalibrationStore;
use umbra_arm::motor::{CalibrationSet, Motor, MotorCalibration};

/// Every motor homed at 0 with a 1000..3000 range: signed-percent joints
/// then move 10 ticks per unit around 2000.
pub fn calibration_for(motors: &BTreeMap<String, Motor>) -> CalibrationSet {
    motors
        .iter()
        .map(|(name, m)| {
            (
                name.clone(),
                MotorCalibration {
                    id: m.id,
                    drive_mode: 0,
                    homing_offset: 0,
                    range_min: 1000,
                    range_max: 3000,
                },
            )
        })
        .collect()
}

pub fn save_calibration(dir: &Path, kind: &str, id: &str, set: &CalibrationSet) {
    CalibrationStore::new(dir, kind, id).save(set).unwrap();
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
