//! Conversion between raw servo ticks and the physical units callers use.

pub mod linear;
pub mod mirrored;

use log::debug;
use std::f64::consts::PI;

use crate::bus::{MotorBus, Register};
use crate::calibration::write_motor_calibration;
use crate::error::{ArmError, BusError};
use crate::motor::{CalibrationSet, MAX_TICK, Motor, MotorCalibration, NormMode};
use crate::orientation::{Correction, OrientationTable};

pub use linear::LinearActuator;
pub use mirrored::MirroredJoint;

/// STS3215 ticks per radian, zero at the middle of the encoder.
pub const TICKS_PER_RADIAN: f64 = 2048.0 / PI;
pub const DEFAULT_OFFSET: f64 = 2048.0;

/// One logical actuator in user units, backed by one or more motors.
///
/// Register access borrows the bus for the duration of the call; the
/// actuator never owns it.
pub trait UnitActuator {
    fn name(&self) -> &str;

    /// The single-motor actuators doing the work, primary first.
    fn members(&self) -> &[ScaledActuator];

    fn to_device(&self, value: f64) -> i32 {
        self.members()[0].to_device(value)
    }

    fn from_device(&self, ticks: i32) -> f64 {
        self.members()[0].from_device(ticks)
    }

    /// Joint position from per-member positions given in `members()` order.
    fn combine(&self, member_values: &[f64]) -> f64 {
        member_values.first().copied().unwrap_or_default()
    }

    fn is_connected(&self) -> bool {
        self.members().iter().all(|m| m.connected)
    }

    /// Fold each member's side correction into its own mapping.
    fn apply_orientation(&mut self, table: &OrientationTable);

    fn connect(&mut self, bus: &mut dyn MotorBus) -> Result<(), BusError>;

    fn disconnect(&mut self, bus: &mut dyn MotorBus) -> Result<(), BusError>;

    fn read(&self, bus: &mut dyn MotorBus, register: Register) -> Result<f64, BusError>;

    fn write(&self, bus: &mut dyn MotorBus, register: Register, value: f64)
    -> Result<(), BusError>;

    /// Write every member's own calibration record to its motor.
    fn calibrate(
        &self,
        bus: &mut dyn MotorBus,
        calibration: &CalibrationSet,
    ) -> Result<(), BusError> {
        for member in self.members() {
            let record = calibration
                .get(member.name())
                .ok_or_else(|| BusError::UnknownMotor(member.name().to_string()))?;
            write_motor_calibration(bus, member.id(), record)?;
        }
        Ok(())
    }
}

/// A single motor with a linear tick mapping:
/// `ticks = offset + orientation * value * scale`.
#[derive(Debug, Clone)]
pub struct ScaledActuator {
    name: String,
    id: u8,
    scale: f64,
    offset: f64,
    orientation: f64,
    connected: bool,
}

impl ScaledActuator {
    pub fn new(name: &str, id: u8, scale: f64, offset: f64) -> Result<Self, ArmError> {
        if scale == 0.0 || !scale.is_finite() || !offset.is_finite() {
            return Err(ArmError::InvalidConfiguration(format!(
                "actuator '{name}': scale {scale} / offset {offset} cannot be inverted"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            id,
            scale,
            offset,
            orientation: 1.0,
            connected: false,
        })
    }

    /// Radians around the encoder middle.
    pub fn radians(name: &str, id: u8) -> Self {
        Self {
            name: name.to_string(),
            id,
            scale: TICKS_PER_RADIAN,
            offset: DEFAULT_OFFSET,
            orientation: 1.0,
            connected: false,
        }
    }

    /// Mapping implied by a motor's normalization mode and its calibrated range.
    pub fn from_calibration(
        name: &str,
        motor: &Motor,
        calibration: &MotorCalibration,
    ) -> Result<Self, ArmError> {
        if !calibration.is_valid() {
            return Err(ArmError::InvalidConfiguration(format!(
                "motor '{name}': range_min {} is not below range_max {}",
                calibration.range_min, calibration.range_max
            )));
        }
        let (scale, offset) = match motor.norm_mode {
            NormMode::Degrees => (MAX_TICK as f64 / 360.0, calibration.mid()),
            NormMode::RangeM100_100 => (calibration.span() / 200.0, calibration.mid()),
            NormMode::Range0_100 => (calibration.span() / 100.0, calibration.range_min as f64),
        };
        Self::new(name, motor.id, scale, offset)
    }

    /// Turn the raw direction around.
    pub fn reversed(mut self) -> Self {
        self.orientation = -self.orientation;
        self
    }

    /// Fold a side correction into the mapping: the motor is driven to
    /// `rule.apply(value)` while callers keep working in uncorrected units.
    pub fn correct(&mut self, rule: Correction) {
        match rule {
            Correction::Keep => {}
            Correction::Negate => self.orientation = -self.orientation,
            Correction::Reflect(about) => {
                self.offset += 2.0 * about * self.orientation * self.scale;
                self.orientation = -self.orientation;
            }
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn orientation(&self) -> f64 {
        self.orientation
    }

    pub fn to_device(&self, value: f64) -> i32 {
        (self.offset + self.orientation * value * self.scale).round() as i32
    }

    pub fn from_device(&self, ticks: i32) -> f64 {
        (ticks as f64 - self.offset) / (self.orientation * self.scale)
    }
}

impl UnitActuator for ScaledActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> &[ScaledActuator] {
        std::slice::from_ref(self)
    }

    fn apply_orientation(&mut self, table: &OrientationTable) {
        let rule = table.rule(&self.name);
        self.correct(rule);
    }

    fn connect(&mut self, bus: &mut dyn MotorBus) -> Result<(), BusError> {
        bus.read(Register::PresentPosition, self.id)?;
        self.connected = true;
        debug!("Actuator {} (id {}) answered", self.name, self.id);
        Ok(())
    }

    fn disconnect(&mut self, _bus: &mut dyn MotorBus) -> Result<(), BusError> {
        self.connected = false;
        Ok(())
    }

    fn read(&self, bus: &mut dyn MotorBus, register: Register) -> Result<f64, BusError> {
        let raw = bus.read(register, self.id)?;
        if register.is_position() {
            Ok(ScaledActuator::from_device(self, raw))
        } else {
            Ok(raw as f64)
        }
    }

    fn write(
        &self,
        bus: &mut dyn MotorBus,
        register: Register,
        value: f64,
    ) -> Result<(), BusError> {
        let raw = if register.is_position() {
            ScaledActuator::to_device(self, value)
        } else {
            value.round() as i32
        };
        bus.write(register, self.id, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimBus;
    use std::collections::BTreeMap;

    #[test]
    fn round_trip_within_a_tick() {
        for (scale, offset) in [(TICKS_PER_RADIAN, 2048.0), (-57.7, 2903.0), (11.375, 0.0)] {
            let act = ScaledActuator::new("j", 1, scale, offset).unwrap();
            for x in [-1.5, -0.25, 0.0, 0.3, 1.0, 12.0] {
                let back = act.from_device(act.to_device(x));
                assert!((back - x).abs() <= 0.5 / scale.abs() + 1e-9, "{x} -> {back}");
            }
        }
    }

    #[test]
    fn rejects_zero_scale() {
        assert!(matches!(
            ScaledActuator::new("j", 1, 0.0, 2048.0),
            Err(ArmError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn orientation_flips_raw_direction() {
        let act = ScaledActuator::radians("j", 1).reversed();
        assert_eq!(act.orientation(), -1.0);
        assert_eq!(act.to_device(0.0), 2048);
        assert!(act.to_device(0.5) < 2048);
        assert!((act.from_device(act.to_device(0.5)) - 0.5).abs() < 1e-3);
        assert_eq!(act.reversed().orientation(), 1.0);
    }

    #[test]
    fn corrections_fold_into_the_mapping() {
        let plain = ScaledActuator::new("g", 9, 20.0, 1000.0).unwrap();
        for rule in [Correction::Keep, Correction::Negate, Correction::Reflect(50.0)] {
            for base in [plain.clone(), plain.clone().reversed()] {
                let mut corrected = base.clone();
                corrected.correct(rule);
                for v in [-30.0, 0.0, 12.0, 75.0] {
                    assert_eq!(corrected.to_device(v), base.to_device(rule.apply(v)), "{rule:?}");
                }
                for ticks in [0, 1000, 2048, 3500] {
                    let expected = rule.apply(base.from_device(ticks));
                    assert!((corrected.from_device(ticks) - expected).abs() < 1e-9, "{rule:?}");
                }
            }
        }
    }

    #[test]
    fn normalization_modes() {
        let cal = MotorCalibration {
            id: 1,
            drive_mode: 0,
            homing_offset: 0,
            range_min: 1000,
            range_max: 3000,
        };
        let pct = ScaledActuator::from_calibration(
            "g",
            &Motor::sts3215(1, NormMode::Range0_100),
            &cal,
        )
        .unwrap();
        assert_eq!(pct.to_device(0.0), 1000);
        assert_eq!(pct.to_device(100.0), 3000);

        let signed = ScaledActuator::from_calibration(
            "b",
            &Motor::sts3215(1, NormMode::RangeM100_100),
            &cal,
        )
        .unwrap();
        assert_eq!(signed.to_device(-100.0), 1000);
        assert_eq!(signed.to_device(0.0), 2000);

        let deg =
            ScaledActuator::from_calibration("b", &Motor::sts3215(1, NormMode::Degrees), &cal)
                .unwrap();
        assert!((deg.from_device(2000) - 0.0).abs() < 1e-9);
        assert!((deg.from_device(2000 + 4095) - 360.0).abs() < 1e-9);
    }

    #[test]
    fn read_write_go_through_the_bus() {
        let motors = BTreeMap::from([("base".to_string(), Motor::sts3215(1, NormMode::Degrees))]);
        let mut bus = SimBus::new(motors);
        bus.connect().unwrap();
        let act = ScaledActuator::radians("base", 1);

        act.write(&mut bus, Register::GoalPosition, 0.5).unwrap();
        assert_eq!(bus.register("base", Register::GoalPosition), Some(2374));
        let back = act.read(&mut bus, Register::PresentPosition).unwrap();
        assert!((back - 0.5).abs() < 1e-3);

        act.write(&mut bus, Register::GoalVelocity, 500.0).unwrap();
        assert_eq!(act.read(&mut bus, Register::GoalVelocity).unwrap(), 500.0);
    }
}
