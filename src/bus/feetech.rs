use log::{debug, info};
use rustypot::servo::feetech::sts3215::Sts3215Controller;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use super::{MotorBus, Register};
use crate::error::BusError;
use crate::motor::{MAX_TICK, Motor};

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;

/// rustypot reports STS3215 positions in radians, zero at this tick.
const RUSTYPOT_ZERO_TICK: f64 = 2048.0;
const TICKS_PER_TURN: f64 = 4096.0;

fn ticks_to_radians(ticks: i32) -> f64 {
    (ticks as f64 - RUSTYPOT_ZERO_TICK) * TAU / TICKS_PER_TURN
}

fn radians_to_ticks(radians: f64) -> i32 {
    (radians * TICKS_PER_TURN / TAU + RUSTYPOT_ZERO_TICK).round() as i32
}

/// STS3215 servos behind a serial adapter, driven through rustypot.
///
/// The homing offset and position limits are held here and applied to
/// position traffic, so present positions are reported in the homed frame
/// just like the servo firmware would.
pub struct FeetechBus {
    port: String,
    baudrate: u32,
    timeout: Duration,
    motors: BTreeMap<String, Motor>,
    controller: Option<Sts3215Controller>,
    held: HashMap<(u8, Register), i32>,
}

impl FeetechBus {
    pub fn new(port: &str, motors: BTreeMap<String, Motor>) -> Self {
        Self {
            port: port.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            timeout: Duration::from_millis(100),
            motors,
            controller: None,
            held: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn controller(&mut self) -> Result<&mut Sts3215Controller, BusError> {
        let port = self.port.clone();
        self.controller
            .as_mut()
            .ok_or(BusError::NotConnected { port })
    }

    fn homing(&self, id: u8) -> i32 {
        self.held
            .get(&(id, Register::HomingOffset))
            .copied()
            .unwrap_or(0)
    }

    fn ids(&self) -> Vec<u8> {
        self.motors.values().map(|m| m.id).collect()
    }
}

fn transport<E: std::fmt::Display>(e: E) -> BusError {
    BusError::Transport(e.to_string())
}

impl MotorBus for FeetechBus {
    fn motors(&self) -> &BTreeMap<String, Motor> {
        &self.motors
    }

    fn port(&self) -> &str {
        &self.port
    }

    fn is_connected(&self) -> bool {
        self.controller.is_some()
    }

    fn connect(&mut self) -> Result<(), BusError> {
        let serial_port = serialport::new(self.port.as_str(), self.baudrate)
            .timeout(self.timeout)
            .open()?;

        let controller = Sts3215Controller::new()
            .with_protocol_v1()
            .with_serial_port(serial_port);
        self.controller = Some(controller);
        info!("Opened {} at {} baud", self.port, self.baudrate);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        if self.controller.take().is_none() {
            return Err(BusError::NotConnected {
                port: self.port.clone(),
            });
        }
        info!("Closed {}", self.port);
        Ok(())
    }

    fn supports(&self, register: Register) -> bool {
        matches!(
            register,
            Register::TorqueEnable
                | Register::PresentPosition
                | Register::GoalPosition
                | Register::GoalVelocity
                | Register::HomingOffset
                | Register::MinPositionLimit
                | Register::MaxPositionLimit
                | Register::MaxTorqueLimit
        )
    }

    fn read(&mut self, register: Register, id: u8) -> Result<i32, BusError> {
        match register {
            Register::PresentPosition => {
                let homing = self.homing(id);
                let positions = self
                    .controller()?
                    .sync_read_present_position(&[id])
                    .map_err(transport)?;
                let radians = positions.first().copied().ok_or(BusError::Malformed {
                    id,
                    detail: "empty position reply".to_string(),
                })?;
                Ok(radians_to_ticks(radians) - homing)
            }
            Register::HomingOffset => Ok(self.homing(id)),
            Register::MinPositionLimit => Ok(self.held.get(&(id, register)).copied().unwrap_or(0)),
            Register::MaxPositionLimit => Ok(self
                .held
                .get(&(id, register))
                .copied()
                .unwrap_or(MAX_TICK)),
            Register::TorqueEnable | Register::GoalVelocity | Register::MaxTorqueLimit => self
                .held
                .get(&(id, register))
                .copied()
                .ok_or(BusError::UnsupportedRegister(register)),
            _ => Err(BusError::UnsupportedRegister(register)),
        }
    }

    fn write(&mut self, register: Register, id: u8, value: i32) -> Result<(), BusError> {
        let homing = self.homing(id);
        match register {
            Register::GoalPosition => {
                let radians = ticks_to_radians(value + homing);
                self.controller()?
                    .sync_write_goal_position(&[id], &[radians])
                    .map_err(transport)?;
            }
            Register::GoalVelocity => {
                // Goal_Velocity is given in steps/s; rustypot takes rad/s.
                let speed = value as f64 * TAU / TICKS_PER_TURN;
                self.controller()?
                    .sync_write_goal_speed(&[id], &[speed])
                    .map_err(transport)?;
            }
            Register::TorqueEnable => {
                self.controller()?
                    .write_torque_enable(id, value != 0)
                    .map_err(transport)?;
            }
            Register::HomingOffset => {}
            Register::MinPositionLimit => {
                let radians = ticks_to_radians(value + homing);
                self.controller()?
                    .sync_write_min_angle_limit(&[id], &[radians])
                    .map_err(transport)?;
            }
            Register::MaxPositionLimit => {
                let radians = ticks_to_radians(value + homing);
                self.controller()?
                    .sync_write_max_angle_limit(&[id], &[radians])
                    .map_err(transport)?;
            }
            Register::MaxTorqueLimit => {
                let limit = u16::try_from(value).map_err(|_| BusError::Malformed {
                    id,
                    detail: format!("torque limit {value} out of range"),
                })?;
                self.controller()?
                    .sync_write_torque_limit(&[id], &[limit])
                    .map_err(transport)?;
            }
            _ => return Err(BusError::UnsupportedRegister(register)),
        }
        self.held.insert((id, register), value);
        Ok(())
    }

    fn sync_read(&mut self, register: Register) -> Result<BTreeMap<String, i32>, BusError> {
        if register != Register::PresentPosition {
            let names: Vec<(String, u8)> =
                self.motors.iter().map(|(n, m)| (n.clone(), m.id)).collect();
            let mut values = BTreeMap::new();
            for (name, id) in names {
                values.insert(name, self.read(register, id)?);
            }
            return Ok(values);
        }

        let start = Instant::now();
        let ids = self.ids();
        let positions = self
            .controller()?
            .sync_read_present_position(&ids)
            .map_err(transport)?;
        if positions.len() != ids.len() {
            return Err(BusError::Malformed {
                id: ids.first().copied().unwrap_or_default(),
                detail: format!("expected {} positions, got {}", ids.len(), positions.len()),
            });
        }

        let values = self
            .motors
            .iter()
            .zip(positions)
            .map(|((name, m), rad)| (name.clone(), radians_to_ticks(rad) - self.homing(m.id)))
            .collect();
        debug!(
            "{} sync read: {:.1}ms",
            self.port,
            start.elapsed().as_secs_f64() * 1e3
        );
        Ok(values)
    }

    fn sync_write(
        &mut self,
        register: Register,
        values: &BTreeMap<String, i32>,
    ) -> Result<(), BusError> {
        if register != Register::GoalPosition {
            for (name, value) in values {
                let id = self.motor_id(name)?;
                self.write(register, id, *value)?;
            }
            return Ok(());
        }

        let mut ids = Vec::with_capacity(values.len());
        let mut goals = Vec::with_capacity(values.len());
        for (name, value) in values {
            let id = self.motor_id(name)?;
            ids.push(id);
            goals.push(ticks_to_radians(value + self.homing(id)));
        }
        self.controller()?
            .sync_write_goal_position(&ids, &goals)
            .map_err(transport)?;
        for (id, (_, value)) in ids.into_iter().zip(values) {
            self.held.insert((id, Register::GoalPosition), *value);
        }
        Ok(())
    }
}
