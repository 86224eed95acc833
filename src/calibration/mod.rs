//! Homing and range-of-motion recording.
//!
//! ```text
//! UNCALIBRATED -> HOMING -> RANGE_RECORDING -> CALIBRATED
//! CALIBRATED --reuse--> CALIBRATED
//! CALIBRATED --recalibrate--> HOMING
//! ```
//!
//! A run either completes and replaces the stored records, or it stops and
//! the previous records stay exactly as they were, on disk and in memory.

pub mod operator;
pub mod store;

use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::bus::{MotorBus, OperatingMode, Register};
use crate::error::{ArmError, ArmResult, BusError};
use crate::motor::{CalibrationSet, HALF_TURN_TICK, MAX_TICK, MotorCalibration};

pub use operator::{Operator, Ranges, ScriptedOperator, TerminalOperator};
pub use store::CalibrationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Uncalibrated,
    Homing,
    RangeRecording,
    Calibrated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    /// The operator kept the stored records; they were written to the motors.
    Reused(CalibrationSet),
    /// New records were written to the motors and saved.
    Recorded(CalibrationSet),
    /// Some motors never moved during range recording; nothing was saved.
    Aborted { motors: Vec<String> },
}

impl CalibrationOutcome {
    pub fn calibration(&self) -> Option<&CalibrationSet> {
        match self {
            CalibrationOutcome::Reused(set) | CalibrationOutcome::Recorded(set) => Some(set),
            CalibrationOutcome::Aborted { .. } => None,
        }
    }
}

/// Internal guard: the recorded ranges cannot form valid records.
#[derive(Debug)]
struct IncompleteCalibration {
    motors: Vec<String>,
}

pub fn write_motor_calibration(
    bus: &mut dyn MotorBus,
    id: u8,
    calibration: &MotorCalibration,
) -> Result<(), BusError> {
    bus.write(Register::HomingOffset, id, calibration.homing_offset)?;
    bus.write(Register::MinPositionLimit, id, calibration.range_min)?;
    bus.write(Register::MaxPositionLimit, id, calibration.range_max)
}

pub fn write_calibration(bus: &mut dyn MotorBus, set: &CalibrationSet) -> Result<(), BusError> {
    for (motor, calibration) in set {
        let id = bus.motor_id(motor)?;
        write_motor_calibration(bus, id, calibration)?;
    }
    Ok(())
}

/// Whether every motor on the bus holds exactly the records of `set`.
pub fn matches_bus(bus: &mut dyn MotorBus, set: &CalibrationSet) -> Result<bool, BusError> {
    let motors: Vec<(String, u8)> = bus
        .motors()
        .iter()
        .map(|(name, m)| (name.clone(), m.id))
        .collect();
    for (name, id) in motors {
        let Some(expected) = set.get(&name) else {
            debug!("No calibration record for {name}");
            return Ok(false);
        };
        let live = (
            bus.read(Register::HomingOffset, id)?,
            bus.read(Register::MinPositionLimit, id)?,
            bus.read(Register::MaxPositionLimit, id)?,
        );
        if live != (expected.homing_offset, expected.range_min, expected.range_max) {
            debug!("{name}: motor holds {live:?}, record says {expected:?}");
            return Ok(false);
        }
    }
    Ok(true)
}

pub struct Calibrator<'a> {
    device: &'a str,
    state: CalibrationState,
    enable_torque_after: bool,
}

impl<'a> Calibrator<'a> {
    pub fn new(device: &'a str, existing: Option<&CalibrationSet>) -> Self {
        let state = if existing.is_some() {
            CalibrationState::Calibrated
        } else {
            CalibrationState::Uncalibrated
        };
        Self {
            device,
            state,
            enable_torque_after: false,
        }
    }

    /// Re-enable torque once new records are in place.
    pub fn enable_torque_after(mut self, enable: bool) -> Self {
        self.enable_torque_after = enable;
        self
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    fn transport(&self, source: BusError) -> ArmError {
        ArmError::Transport {
            device: self.device.to_string(),
            source,
        }
    }

    fn enter(&mut self, state: CalibrationState) {
        debug!("{}: calibration {:?} -> {:?}", self.device, self.state, state);
        self.state = state;
    }

    pub fn run(
        &mut self,
        bus: &mut dyn MotorBus,
        existing: Option<&CalibrationSet>,
        store: &CalibrationStore,
        operator: &mut dyn Operator,
    ) -> ArmResult<CalibrationOutcome> {
        if let Some(existing) = existing
            && operator.confirm_reuse(self.device)?
        {
            info!("Writing stored calibration of {} to the motors", self.device);
            write_calibration(bus, existing).map_err(|e| self.transport(e))?;
            self.enter(CalibrationState::Calibrated);
            return Ok(CalibrationOutcome::Reused(existing.clone()));
        }

        let resting = self.state;
        let result = self.record(bus, store, operator);
        match &result {
            Ok(CalibrationOutcome::Aborted { .. }) | Err(_) => self.enter(resting),
            Ok(_) => {}
        }
        result
    }

    fn record(
        &mut self,
        bus: &mut dyn MotorBus,
        store: &CalibrationStore,
        operator: &mut dyn Operator,
    ) -> ArmResult<CalibrationOutcome> {
        info!("Running calibration of {}", self.device);
        self.enter(CalibrationState::Homing);
        let homing_offsets = self.home(bus, operator)?;

        self.enter(CalibrationState::RangeRecording);
        operator.begin_range_recording(self.device)?;
        let recorded = self.record_ranges(bus, operator);
        operator.end_range_recording()?;
        let ranges = recorded?;

        let set = match synthesize(bus, &homing_offsets, &ranges) {
            Ok(set) => set,
            Err(IncompleteCalibration { motors }) => {
                warn!(
                    "{}: {motors:?} did not move during range recording, calibration not saved",
                    self.device
                );
                return Ok(CalibrationOutcome::Aborted { motors });
            }
        };

        write_calibration(bus, &set).map_err(|e| self.transport(e))?;
        store.save(&set)?;
        operator.calibration_saved(self.device, store.path());
        self.enter(CalibrationState::Calibrated);

        if self.enable_torque_after {
            bus.enable_torque().map_err(|e| self.transport(e))?;
        }
        Ok(CalibrationOutcome::Recorded(set))
    }

    /// Capture per-motor offsets that put the reference pose at half a turn.
    fn home(
        &self,
        bus: &mut dyn MotorBus,
        operator: &mut dyn Operator,
    ) -> ArmResult<BTreeMap<String, i32>> {
        let transport = |e: BusError| self.transport(e);
        bus.disable_torque().map_err(transport)?;
        if bus.supports(Register::OperatingMode) {
            let modes = bus
                .motors()
                .keys()
                .map(|m| (m.clone(), OperatingMode::Position as i32))
                .collect();
            bus.sync_write(Register::OperatingMode, &modes)
                .map_err(transport)?;
        }

        operator.await_reference_pose(self.device)?;

        let motors: Vec<u8> = bus.motors().values().map(|m| m.id).collect();
        for id in motors {
            write_motor_calibration(bus, id, &MotorCalibration::uncalibrated(id))
                .map_err(transport)?;
        }
        let raw = bus.sync_read(Register::PresentPosition).map_err(transport)?;
        let offsets: BTreeMap<String, i32> = raw
            .into_iter()
            .map(|(motor, pos)| (motor, pos - HALF_TURN_TICK))
            .collect();
        bus.sync_write(Register::HomingOffset, &offsets)
            .map_err(transport)?;
        debug!("{}: homing offsets {offsets:?}", self.device);
        Ok(offsets)
    }

    /// Sample present positions until the operator is done, keeping the
    /// running min/max per motor.
    fn record_ranges(
        &self,
        bus: &mut dyn MotorBus,
        operator: &mut dyn Operator,
    ) -> ArmResult<Ranges> {
        let transport = |e: BusError| self.transport(e);
        let mut ranges: Ranges = bus
            .sync_read(Register::PresentPosition)
            .map_err(transport)?
            .into_iter()
            .map(|(motor, pos)| (motor, (pos, pos)))
            .collect();
        while !operator.range_recording_done(&ranges)? {
            for (motor, pos) in bus.sync_read(Register::PresentPosition).map_err(transport)? {
                let entry = ranges.entry(motor).or_insert((pos, pos));
                entry.0 = entry.0.min(pos);
                entry.1 = entry.1.max(pos);
            }
        }
        Ok(ranges)
    }
}

fn synthesize(
    bus: &dyn MotorBus,
    homing_offsets: &BTreeMap<String, i32>,
    ranges: &Ranges,
) -> Result<CalibrationSet, IncompleteCalibration> {
    let mut set = CalibrationSet::new();
    let mut incomplete = Vec::new();
    for (motor, m) in bus.motors() {
        let record = match (homing_offsets.get(motor), ranges.get(motor)) {
            (Some(&homing_offset), Some(&(min, max))) => MotorCalibration {
                id: m.id,
                drive_mode: 0,
                homing_offset,
                range_min: min.max(0),
                range_max: max.min(MAX_TICK),
            },
            _ => {
                incomplete.push(motor.clone());
                continue;
            }
        };
        if record.is_valid() {
            set.insert(motor.clone(), record);
        } else {
            incomplete.push(motor.clone());
        }
    }
    if incomplete.is_empty() {
        Ok(set)
    } else {
        Err(IncompleteCalibration { motors: incomplete })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimBus;
    use crate::motor::{Motor, NormMode};

    fn bus() -> SimBus {
        let mut bus = SimBus::new(BTreeMap::from([
            ("base".to_string(), Motor::sts3215(1, NormMode::RangeM100_100)),
            ("gripper".to_string(), Motor::sts3215(2, NormMode::Range0_100)),
        ]));
        bus.connect().unwrap();
        bus
    }

    /// Reference pose at 2100, then a sweep through `low..high`.
    fn sweep(bus: &mut SimBus, low: i32, high: i32) {
        for motor in ["base", "gripper"] {
            bus.queue_sweep(motor, &[2100, low, high]);
        }
    }

    #[test]
    fn synthesize_clamps_and_flags_motionless_motors() {
        let bus = bus();
        let offsets = BTreeMap::from([("base".to_string(), 10), ("gripper".to_string(), -3)]);
        let ranges = Ranges::from([
            ("base".to_string(), (-20, 5000)),
            ("gripper".to_string(), (1200, 2900)),
        ]);
        let set = synthesize(&bus, &offsets, &ranges).unwrap();
        assert_eq!(set["base"].range_min, 0);
        assert_eq!(set["base"].range_max, MAX_TICK);
        assert_eq!(set["gripper"].homing_offset, -3);
        assert_eq!(set["gripper"].id, 2);

        let still = Ranges::from([
            ("base".to_string(), (2047, 2047)),
            ("gripper".to_string(), (1200, 2900)),
        ]);
        let err = synthesize(&bus, &offsets, &still).unwrap_err();
        assert_eq!(err.motors, vec!["base".to_string()]);
    }

    #[test]
    fn full_run_writes_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), "umbra_follower", "arm");
        let mut bus = bus();
        sweep(&mut bus, 900, 3100);
        let mut operator = ScriptedOperator::recalibrate(3);

        let mut calibrator = Calibrator::new("arm", None).enable_torque_after(true);
        let outcome = calibrator
            .run(&mut bus, None, &store, &mut operator)
            .unwrap();

        let set = outcome.calibration().unwrap().clone();
        assert_eq!(calibrator.state(), CalibrationState::Calibrated);
        // 2100 at the reference pose lands on the half turn.
        assert_eq!(set["base"].homing_offset, 53);
        assert_eq!(set["base"].range_min, 900 - 53);
        assert_eq!(set["base"].range_max, 3100 - 53);
        assert_eq!(set["base"].drive_mode, 0);

        assert_eq!(bus.register("base", Register::HomingOffset), Some(53));
        assert_eq!(bus.register("base", Register::MinPositionLimit), Some(847));
        assert_eq!(bus.register("gripper", Register::TorqueEnable), Some(1));
        assert_eq!(store.load().unwrap(), Some(set));
        assert_eq!(
            operator.prompts(),
            &["pose arm".to_string(), "record arm".to_string()]
        );
    }

    #[test]
    fn motionless_run_is_aborted_and_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), "umbra_follower", "arm");
        let mut bus = bus();
        let mut operator = ScriptedOperator::recalibrate(4);

        let mut calibrator = Calibrator::new("arm", None);
        let outcome = calibrator
            .run(&mut bus, None, &store, &mut operator)
            .unwrap();
        assert!(matches!(outcome, CalibrationOutcome::Aborted { ref motors } if motors.len() == 2));
        assert_eq!(calibrator.state(), CalibrationState::Uncalibrated);
        assert!(!store.path().exists());
    }

    #[test]
    fn bus_failure_keeps_the_previous_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), "umbra_follower", "arm");
        let previous = CalibrationSet::from([
            ("base".to_string(), MotorCalibration::uncalibrated(1)),
            ("gripper".to_string(), MotorCalibration::uncalibrated(2)),
        ]);
        store.save(&previous).unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let mut bus = bus();
        sweep(&mut bus, 900, 3100);
        bus.fail_after(12);
        let mut operator = ScriptedOperator::recalibrate(3);
        let mut calibrator = Calibrator::new("arm", Some(&previous));

        let result = calibrator.run(&mut bus, Some(&previous), &store, &mut operator);
        assert!(matches!(result, Err(ArmError::Transport { .. })));
        assert_eq!(calibrator.state(), CalibrationState::Calibrated);
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn reuse_writes_the_stored_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), "umbra_follower", "arm");
        let stored = CalibrationSet::from([
            (
                "base".to_string(),
                MotorCalibration {
                    id: 1,
                    drive_mode: 0,
                    homing_offset: 40,
                    range_min: 700,
                    range_max: 3300,
                },
            ),
            ("gripper".to_string(), MotorCalibration::uncalibrated(2)),
        ]);
        let mut bus = bus();
        assert!(!matches_bus(&mut bus, &stored).unwrap());

        let mut operator = ScriptedOperator::reuse();
        let outcome = Calibrator::new("arm", Some(&stored))
            .run(&mut bus, Some(&stored), &store, &mut operator)
            .unwrap();
        assert_eq!(outcome, CalibrationOutcome::Reused(stored.clone()));
        assert!(matches_bus(&mut bus, &stored).unwrap());
        assert!(!store.path().exists());
    }
}
