use crate::actuator::{ScaledActuator, UnitActuator};
use crate::bus::{MotorBus, Register};
use crate::error::{ArmError, BusError};
use crate::orientation::OrientationTable;

/// Jaw opening of the stock gripper, in meters, and the ticks at each end.
pub const GRIPPER_MIN_DIST: f64 = 0.0;
pub const GRIPPER_MAX_DIST: f64 = 0.024;
pub const GRIPPER_MIN_TICKS: i32 = 2903;
pub const GRIPPER_MAX_TICKS: i32 = 1518;

/// A distance-driven joint such as a gripper jaw.
///
/// Built from two reference points; when growing distance means shrinking
/// ticks the scale is negative, which the shared conversion handles as is.
#[derive(Debug, Clone)]
pub struct LinearActuator {
    inner: ScaledActuator,
    min_dist: f64,
    max_dist: f64,
}

impl LinearActuator {
    pub fn new(
        name: &str,
        id: u8,
        min_dist: f64,
        max_dist: f64,
        min_ticks: i32,
        max_ticks: i32,
    ) -> Result<Self, ArmError> {
        if max_dist == min_dist {
            return Err(ArmError::InvalidConfiguration(format!(
                "linear actuator '{name}': min and max distance are both {min_dist}"
            )));
        }
        let scale = (max_ticks - min_ticks) as f64 / (max_dist - min_dist);
        let inner = ScaledActuator::new(name, id, scale, min_ticks as f64)?;
        Ok(Self {
            inner,
            min_dist,
            max_dist,
        })
    }

    pub fn gripper(name: &str, id: u8) -> Result<Self, ArmError> {
        Self::new(
            name,
            id,
            GRIPPER_MIN_DIST,
            GRIPPER_MAX_DIST,
            GRIPPER_MIN_TICKS,
            GRIPPER_MAX_TICKS,
        )
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min_dist, self.max_dist)
    }
}

impl UnitActuator for LinearActuator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn members(&self) -> &[ScaledActuator] {
        std::slice::from_ref(&self.inner)
    }

    fn apply_orientation(&mut self, table: &OrientationTable) {
        self.inner.apply_orientation(table);
    }

    fn connect(&mut self, bus: &mut dyn MotorBus) -> Result<(), BusError> {
        self.inner.connect(bus)
    }

    fn disconnect(&mut self, bus: &mut dyn MotorBus) -> Result<(), BusError> {
        self.inner.disconnect(bus)
    }

    fn read(&self, bus: &mut dyn MotorBus, register: Register) -> Result<f64, BusError> {
        self.inner.read(bus, register)
    }

    fn write(
        &self,
        bus: &mut dyn MotorBus,
        register: Register,
        value: f64,
    ) -> Result<(), BusError> {
        self.inner.write(bus, register, value)
    }
}
