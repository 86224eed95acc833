//! In-memory stand-in for a servo bus.
//!
//! Each simulated motor has a register file and a physical position.
//! `Present_Position` reports the physical position minus `Homing_Offset`,
//! and `Goal_Position` moves the motor there instantly. Faults can be
//! injected to exercise the error paths of the layers above.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{MotorBus, Register};
use crate::error::BusError;
use crate::motor::{MAX_TICK, Motor};

#[derive(Debug, Clone)]
struct SimMotor {
    physical: i32,
    registers: HashMap<Register, i32>,
    sweep: VecDeque<i32>,
}

impl SimMotor {
    fn new(physical: i32) -> Self {
        let registers = HashMap::from([
            (Register::TorqueEnable, 0),
            (Register::OperatingMode, 0),
            (Register::HomingOffset, 0),
            (Register::MinPositionLimit, 0),
            (Register::MaxPositionLimit, MAX_TICK),
            (Register::GoalVelocity, 0),
        ]);
        Self {
            physical,
            registers,
            sweep: VecDeque::new(),
        }
    }

    fn homing(&self) -> i32 {
        self.registers
            .get(&Register::HomingOffset)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
enum Fault {
    #[default]
    None,
    /// Fail every operation once this many operations succeeded.
    AfterOps(usize),
    /// Fail a single operation once this many operations succeeded.
    OnceAfter(usize),
    /// Fail any access to this register.
    OnRegister(Register),
}

/// A recorded register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimWrite {
    pub register: Register,
    pub id: u8,
    pub value: i32,
}

#[derive(Debug, Clone)]
pub struct SimBus {
    port: String,
    motors: BTreeMap<String, Motor>,
    state: HashMap<u8, SimMotor>,
    connected: bool,
    ops: usize,
    fault: Fault,
    writes: Vec<SimWrite>,
    refuse_connect: bool,
}

impl SimBus {
    /// All motors start at the middle of their travel.
    pub fn new(motors: BTreeMap<String, Motor>) -> Self {
        let state = motors
            .values()
            .map(|m| (m.id, SimMotor::new(2048)))
            .collect();
        Self {
            port: "sim".to_string(),
            motors,
            state,
            connected: false,
            ops: 0,
            fault: Fault::None,
            writes: Vec::new(),
            refuse_connect: false,
        }
    }

    /// Move a motor by hand, as an operator would with torque off.
    pub fn set_physical(&mut self, name: &str, ticks: i32) {
        if let Some(m) = self.motors.get(name)
            && let Some(state) = self.state.get_mut(&m.id)
        {
            state.physical = ticks;
        }
    }

    /// Physical positions taken by a motor on its next position reads,
    /// one per read, as if swept by hand.
    pub fn queue_sweep(&mut self, name: &str, positions: &[i32]) {
        if let Some(m) = self.motors.get(name)
            && let Some(state) = self.state.get_mut(&m.id)
        {
            state.sweep.extend(positions);
        }
    }

    pub fn physical(&self, name: &str) -> Option<i32> {
        let id = self.motors.get(name)?.id;
        self.state.get(&id).map(|s| s.physical)
    }

    pub fn register(&self, name: &str, register: Register) -> Option<i32> {
        let id = self.motors.get(name)?.id;
        self.state.get(&id)?.registers.get(&register).copied()
    }

    pub fn fail_after(&mut self, ops: usize) {
        self.ops = 0;
        self.fault = Fault::AfterOps(ops);
    }

    /// Drop one frame after `ops` operations; the bus answers again after.
    pub fn glitch_after(&mut self, ops: usize) {
        self.ops = 0;
        self.fault = Fault::OnceAfter(ops);
    }

    pub fn fail_on(&mut self, register: Register) {
        self.fault = Fault::OnRegister(register);
    }

    pub fn clear_faults(&mut self) {
        self.fault = Fault::None;
    }

    pub fn refuse_connect(&mut self, refuse: bool) {
        self.refuse_connect = refuse;
    }

    pub fn writes(&self) -> &[SimWrite] {
        &self.writes
    }

    /// Writes of one register, in issue order.
    pub fn writes_to(&self, register: Register) -> Vec<SimWrite> {
        self.writes
            .iter()
            .filter(|w| w.register == register)
            .copied()
            .collect()
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    fn check(&mut self, register: Register, id: u8) -> Result<&mut SimMotor, BusError> {
        if !self.connected {
            return Err(BusError::NotConnected {
                port: self.port.clone(),
            });
        }
        match self.fault {
            Fault::AfterOps(limit) if self.ops >= limit => {
                return Err(BusError::Timeout { id });
            }
            Fault::OnceAfter(limit) if self.ops >= limit => {
                self.fault = Fault::None;
                return Err(BusError::Timeout { id });
            }
            Fault::OnRegister(r) if r == register => {
                return Err(BusError::Disconnected { id });
            }
            _ => {}
        }
        self.ops += 1;
        self.state.get_mut(&id).ok_or(BusError::UnknownMotorId(id))
    }
}

impl MotorBus for SimBus {
    fn motors(&self) -> &BTreeMap<String, Motor> {
        &self.motors
    }

    fn port(&self) -> &str {
        &self.port
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self) -> Result<(), BusError> {
        if self.refuse_connect {
            return Err(BusError::Transport(format!("cannot open {}", self.port)));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NotConnected {
                port: self.port.clone(),
            });
        }
        self.connected = false;
        Ok(())
    }

    fn read(&mut self, register: Register, id: u8) -> Result<i32, BusError> {
        let motor = self.check(register, id)?;
        match register {
            Register::PresentPosition => {
                if let Some(next) = motor.sweep.pop_front() {
                    motor.physical = next;
                }
                Ok(motor.physical - motor.homing())
            }
            other => motor
                .registers
                .get(&other)
                .copied()
                .ok_or(BusError::Malformed {
                    id,
                    detail: format!("{other} was never written"),
                }),
        }
    }

    fn write(&mut self, register: Register, id: u8, value: i32) -> Result<(), BusError> {
        let motor = self.check(register, id)?;
        match register {
            Register::PresentPosition => return Err(BusError::UnsupportedRegister(register)),
            Register::GoalPosition => {
                motor.physical = value + motor.homing();
                motor.registers.insert(register, value);
            }
            other => {
                motor.registers.insert(other, value);
            }
        }
        self.writes.push(SimWrite {
            register,
            id,
            value,
        });
        Ok(())
    }
}
