//! Register-level access to the servos on one serial bus.
//!
//! A bus is owned by exactly one controller. Every operation takes
//! `&mut self`, so register traffic on a bus is serialized by the borrow
//! checker rather than by a lock.

pub mod feetech;
pub mod sim;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::BusError;
use crate::motor::Motor;

pub use feetech::FeetechBus;
pub use sim::SimBus;

/// Named control-table entries of a Feetech STS servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    TorqueEnable,
    OperatingMode,
    PresentPosition,
    GoalPosition,
    GoalVelocity,
    HomingOffset,
    MinPositionLimit,
    MaxPositionLimit,
    PCoefficient,
    ICoefficient,
    DCoefficient,
    MaxTorqueLimit,
    ProtectionCurrent,
    OverloadTorque,
}

impl Register {
    pub fn name(&self) -> &'static str {
        match self {
            Register::TorqueEnable => "Torque_Enable",
            Register::OperatingMode => "Operating_Mode",
            Register::PresentPosition => "Present_Position",
            Register::GoalPosition => "Goal_Position",
            Register::GoalVelocity => "Goal_Velocity",
            Register::HomingOffset => "Homing_Offset",
            Register::MinPositionLimit => "Min_Position_Limit",
            Register::MaxPositionLimit => "Max_Position_Limit",
            Register::PCoefficient => "P_Coefficient",
            Register::ICoefficient => "I_Coefficient",
            Register::DCoefficient => "D_Coefficient",
            Register::MaxTorqueLimit => "Max_Torque_Limit",
            Register::ProtectionCurrent => "Protection_Current",
            Register::OverloadTorque => "Overload_Torque",
        }
    }

    /// Registers that hold a position and therefore go through unit conversion.
    pub fn is_position(&self) -> bool {
        matches!(self, Register::PresentPosition | Register::GoalPosition)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operating modes accepted by `Operating_Mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
    Step = 3,
}

/// The transport collaborator: read/write named registers of motors
/// addressed by integer id. Implementations surface every failure and
/// never retry.
pub trait MotorBus {
    /// Name → motor table of everything attached to this bus.
    fn motors(&self) -> &BTreeMap<String, Motor>;

    fn port(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn connect(&mut self) -> Result<(), BusError>;

    fn disconnect(&mut self) -> Result<(), BusError>;

    fn read(&mut self, register: Register, id: u8) -> Result<i32, BusError>;

    fn write(&mut self, register: Register, id: u8, value: i32) -> Result<(), BusError>;

    /// Whether this transport can reach `register` at all.
    fn supports(&self, _register: Register) -> bool {
        true
    }

    fn motor_id(&self, name: &str) -> Result<u8, BusError> {
        self.motors()
            .get(name)
            .map(|m| m.id)
            .ok_or_else(|| BusError::UnknownMotor(name.to_string()))
    }

    fn sync_read(&mut self, register: Register) -> Result<BTreeMap<String, i32>, BusError> {
        let targets: Vec<(String, u8)> = self
            .motors()
            .iter()
            .map(|(name, m)| (name.clone(), m.id))
            .collect();
        let mut values = BTreeMap::new();
        for (name, id) in targets {
            values.insert(name, self.read(register, id)?);
        }
        Ok(values)
    }

    fn sync_write(
        &mut self,
        register: Register,
        values: &BTreeMap<String, i32>,
    ) -> Result<(), BusError> {
        for (name, value) in values {
            let id = self.motor_id(name)?;
            self.write(register, id, *value)?;
        }
        Ok(())
    }

    fn enable_torque(&mut self) -> Result<(), BusError> {
        let all = self.motors().keys().map(|n| (n.clone(), 1)).collect();
        self.sync_write(Register::TorqueEnable, &all)
    }

    fn disable_torque(&mut self) -> Result<(), BusError> {
        let all = self.motors().keys().map(|n| (n.clone(), 0)).collect();
        self.sync_write(Register::TorqueEnable, &all)
    }
}

/// Groups the per-motor register traffic of many actuators into sync
/// transfers on the underlying bus.
///
/// Present positions are read once for every motor up front. Writes are
/// staged per register and go out as one `sync_write` each, in the order
/// the registers were first written, when the batch is flushed.
pub struct SyncBatch<'a> {
    bus: &'a mut dyn MotorBus,
    positions: Option<HashMap<u8, i32>>,
    staged: Vec<(Register, BTreeMap<String, i32>)>,
}

impl<'a> SyncBatch<'a> {
    pub fn new(bus: &'a mut dyn MotorBus) -> Self {
        Self {
            bus,
            positions: None,
            staged: Vec::new(),
        }
    }

    /// Start from one `sync_read` of every present position.
    pub fn snapshot(bus: &'a mut dyn MotorBus) -> Result<Self, BusError> {
        let raw = bus.sync_read(Register::PresentPosition)?;
        let mut positions = HashMap::with_capacity(raw.len());
        for (name, ticks) in raw {
            positions.insert(bus.motor_id(&name)?, ticks);
        }
        Ok(Self {
            bus,
            positions: Some(positions),
            staged: Vec::new(),
        })
    }

    fn motor_name(&self, id: u8) -> Result<String, BusError> {
        self.bus
            .motors()
            .iter()
            .find(|(_, m)| m.id == id)
            .map(|(name, _)| name.clone())
            .ok_or(BusError::UnknownMotorId(id))
    }

    /// Send everything staged. Nothing reaches the motors before this.
    pub fn flush(self) -> Result<(), BusError> {
        for (register, values) in &self.staged {
            self.bus.sync_write(*register, values)?;
        }
        Ok(())
    }
}

impl MotorBus for SyncBatch<'_> {
    fn motors(&self) -> &BTreeMap<String, Motor> {
        self.bus.motors()
    }

    fn port(&self) -> &str {
        self.bus.port()
    }

    fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }

    fn connect(&mut self) -> Result<(), BusError> {
        self.bus.connect()
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        self.bus.disconnect()
    }

    fn read(&mut self, register: Register, id: u8) -> Result<i32, BusError> {
        match (&self.positions, register) {
            (Some(positions), Register::PresentPosition) => positions
                .get(&id)
                .copied()
                .ok_or(BusError::UnknownMotorId(id)),
            _ => self.bus.read(register, id),
        }
    }

    fn write(&mut self, register: Register, id: u8, value: i32) -> Result<(), BusError> {
        let name = self.motor_name(id)?;
        match self.staged.iter_mut().find(|(r, _)| *r == register) {
            Some((_, values)) => {
                values.insert(name, value);
            }
            None => self.staged.push((register, BTreeMap::from([(name, value)]))),
        }
        Ok(())
    }

    fn supports(&self, register: Register) -> bool {
        self.bus.supports(register)
    }
}
