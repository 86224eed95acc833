//! Single-arm controller: joints, safety clamp, side corrections and the
//! calibration lifecycle over one motor bus.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::thread;
use std::time::Instant;

use super::{Action, Feature, Features, Observation, ObservationValue, POSITION_SUFFIX, position_key};
use crate::actuator::{LinearActuator, MirroredJoint, ScaledActuator, UnitActuator};
use crate::bus::{MotorBus, OperatingMode, Register, SyncBatch};
use crate::calibration::{
    self, CalibrationOutcome, CalibrationStore, Calibrator, Operator,
};
use crate::camera::{Camera, Frame};
use crate::config::MotorTuning;
use crate::error::{ArmError, ArmResult, BusError};
use crate::motor::{CalibrationSet, Motor, MotorCalibration};
use crate::orientation::OrientationTable;
use crate::safety::{MaxRelativeTarget, ensure_safe_goal_position};

/// How one logical joint maps onto the motors of the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum JointSpec {
    /// One motor, scaled by its normalization mode and calibrated range.
    Normalized { id: u8 },
    /// Two opposed motors; the follower is named `<joint>_follower`.
    Mirrored { leader_id: u8, follower_id: u8 },
    /// One motor with a fixed mapping.
    Scaled { id: u8, scale: f64, offset: f64 },
    /// A distance-driven motor, e.g. a gripper jaw in meters.
    Linear {
        id: u8,
        min_dist: f64,
        max_dist: f64,
        min_ticks: i32,
        max_ticks: i32,
    },
}

impl JointSpec {
    /// (motor name, id) of every motor behind `joint`, primary first.
    pub fn members(&self, joint: &str) -> Vec<(String, u8)> {
        match self {
            JointSpec::Mirrored {
                leader_id,
                follower_id,
            } => vec![
                (joint.to_string(), *leader_id),
                (format!("{joint}_follower"), *follower_id),
            ],
            JointSpec::Normalized { id }
            | JointSpec::Scaled { id, .. }
            | JointSpec::Linear { id, .. } => vec![(joint.to_string(), *id)],
        }
    }

    fn build(
        &self,
        joint: &str,
        motors: &BTreeMap<String, Motor>,
        calibration: Option<&CalibrationSet>,
    ) -> ArmResult<Box<dyn UnitActuator>> {
        let normalized = |name: &str| -> ArmResult<ScaledActuator> {
            let motor = motors.get(name).ok_or_else(|| {
                ArmError::InvalidConfiguration(format!("joint '{joint}': no motor '{name}'"))
            })?;
            let record = calibration
                .and_then(|set| set.get(name))
                .copied()
                .unwrap_or_else(|| MotorCalibration::uncalibrated(motor.id));
            ScaledActuator::from_calibration(name, motor, &record)
        };

        let actuator: Box<dyn UnitActuator> = match self {
            JointSpec::Normalized { .. } => Box::new(normalized(joint)?),
            JointSpec::Mirrored { follower_id, .. } => {
                Box::new(MirroredJoint::from_leader(normalized(joint)?, *follower_id)?)
            }
            JointSpec::Scaled { id, scale, offset } => {
                Box::new(ScaledActuator::new(joint, *id, *scale, *offset)?)
            }
            JointSpec::Linear {
                id,
                min_dist,
                max_dist,
                min_ticks,
                max_ticks,
            } => Box::new(LinearActuator::new(
                joint, *id, *min_dist, *max_dist, *min_ticks, *max_ticks,
            )?),
        };
        Ok(actuator)
    }
}

/// What happens to motor torque around the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorquePolicy {
    /// Enable torque once connected so the arm holds commanded poses.
    pub hold_position: bool,
    pub disable_on_disconnect: bool,
}

impl TorquePolicy {
    pub fn follower(disable_on_disconnect: bool) -> Self {
        Self {
            hold_position: true,
            disable_on_disconnect,
        }
    }

    /// Torque stays off so the arm can be moved by hand.
    pub fn leader(disable_on_disconnect: bool) -> Self {
        Self {
            hold_position: false,
            disable_on_disconnect,
        }
    }
}

/// One arm on one bus. Owns the bus and every joint built on it.
pub struct Arm<B: MotorBus> {
    name: String,
    bus: B,
    layout: BTreeMap<String, JointSpec>,
    joints: BTreeMap<String, Box<dyn UnitActuator>>,
    orientation: Option<OrientationTable>,
    max_relative_target: Option<MaxRelativeTarget>,
    store: CalibrationStore,
    calibration: Option<CalibrationSet>,
    cameras: BTreeMap<String, Box<dyn Camera>>,
    torque: TorquePolicy,
    tuning: Option<MotorTuning>,
    gripper: Option<String>,
    connected: bool,
}

impl<B: MotorBus> Arm<B> {
    /// Every motor of the bus must back exactly one joint of `layout`.
    pub fn new(
        name: &str,
        bus: B,
        layout: BTreeMap<String, JointSpec>,
        store: CalibrationStore,
    ) -> ArmResult<Self> {
        let invalid = |detail: String| ArmError::InvalidConfiguration(format!("{name}: {detail}"));
        let mut covered: BTreeMap<String, &str> = BTreeMap::new();
        for (joint, spec) in &layout {
            for (motor, id) in spec.members(joint) {
                match bus.motors().get(&motor) {
                    Some(m) if m.id == id => {}
                    Some(m) => {
                        return Err(invalid(format!(
                            "joint '{joint}' expects motor '{motor}' at id {id}, the bus has id {}",
                            m.id
                        )));
                    }
                    None => {
                        return Err(invalid(format!(
                            "joint '{joint}' needs motor '{motor}', which is not on the bus"
                        )));
                    }
                }
                if let Some(other) = covered.insert(motor.clone(), joint) {
                    return Err(invalid(format!(
                        "motor '{motor}' is claimed by joints '{other}' and '{joint}'"
                    )));
                }
            }
        }
        let orphans: Vec<&String> = bus
            .motors()
            .keys()
            .filter(|m| !covered.contains_key(*m))
            .collect();
        if !orphans.is_empty() {
            return Err(invalid(format!("motors {orphans:?} belong to no joint")));
        }

        let mut arm = Self {
            name: name.to_string(),
            bus,
            layout,
            joints: BTreeMap::new(),
            orientation: None,
            max_relative_target: None,
            store,
            calibration: None,
            cameras: BTreeMap::new(),
            torque: TorquePolicy::follower(true),
            tuning: None,
            gripper: None,
            connected: false,
        };
        arm.joints = arm.build_joints()?;
        Ok(arm)
    }

    /// The table must cover exactly the motors of the bus. Its corrections
    /// are folded into the joints, so positions in and out of the arm stay
    /// in uncorrected units.
    pub fn with_orientation(mut self, table: OrientationTable) -> ArmResult<Self> {
        table.validate(self.bus.motors().keys().map(String::as_str))?;
        self.orientation = Some(table);
        self.joints = self.build_joints()?;
        Ok(self)
    }

    pub fn with_max_relative_target(
        mut self,
        max_relative_target: Option<MaxRelativeTarget>,
    ) -> ArmResult<Self> {
        if let Some(max) = &max_relative_target {
            max.validate()?;
        }
        self.max_relative_target = max_relative_target;
        Ok(self)
    }

    pub fn with_torque_policy(mut self, torque: TorquePolicy) -> Self {
        self.torque = torque;
        self
    }

    /// Registers written by `configure` and with every motion command.
    pub fn with_tuning(mut self, tuning: MotorTuning, gripper: Option<&str>) -> Self {
        self.tuning = Some(tuning);
        self.gripper = gripper.map(str::to_string);
        self
    }

    /// Start from a known calibration instead of the stored one.
    pub fn with_calibration(mut self, calibration: CalibrationSet) -> ArmResult<Self> {
        self.calibration = Some(calibration);
        self.joints = self.build_joints()?;
        Ok(self)
    }

    pub fn with_camera(mut self, name: &str, camera: Box<dyn Camera>) -> Self {
        self.cameras.insert(name.to_string(), camera);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn calibration(&self) -> Option<&CalibrationSet> {
        self.calibration.as_ref()
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    pub fn orientation(&self) -> Option<&OrientationTable> {
        self.orientation.as_ref()
    }

    pub fn joint(&self, name: &str) -> Option<&dyn UnitActuator> {
        self.joints.get(name).map(|j| j.as_ref())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn ensure_connected(&self) -> ArmResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ArmError::NotConnected(self.name.clone()))
        }
    }

    fn build_joints(&self) -> ArmResult<BTreeMap<String, Box<dyn UnitActuator>>> {
        self.layout
            .iter()
            .map(|(joint, spec)| {
                let mut actuator =
                    spec.build(joint, self.bus.motors(), self.calibration.as_ref())?;
                if let Some(table) = &self.orientation {
                    actuator.apply_orientation(table);
                }
                Ok((joint.clone(), actuator))
            })
            .collect()
    }

    /// Rebuild the joints around `calibration`, reconnecting them if the
    /// bus is open.
    fn install_calibration(&mut self, calibration: Option<CalibrationSet>) -> ArmResult<()> {
        self.calibration = calibration;
        self.joints = self.build_joints()?;
        if self.bus.is_connected() {
            for joint in self.joints.values_mut() {
                joint
                    .connect(&mut self.bus)
                    .map_err(ArmError::transport(&self.name))?;
            }
        }
        Ok(())
    }

    /// Every motor's record from `set`; motors it leaves out get the
    /// factory record the joints were built with.
    fn complete_set(&self, set: Option<&CalibrationSet>) -> CalibrationSet {
        self.bus
            .motors()
            .iter()
            .map(|(name, motor)| {
                let record = set
                    .and_then(|set| set.get(name))
                    .copied()
                    .unwrap_or_else(|| MotorCalibration::uncalibrated(motor.id));
                (name.clone(), record)
            })
            .collect()
    }

    /// Write `set` to the motors, one joint at a time.
    fn write_joint_calibration(&mut self, set: Option<&CalibrationSet>) -> ArmResult<()> {
        let set = self.complete_set(set);
        for joint in self.joints.values() {
            joint
                .calibrate(&mut self.bus, &set)
                .map_err(ArmError::transport(&self.name))?;
        }
        Ok(())
    }

    /// Put the records the joints were built from back on the motors, after
    /// a calibration run left them homed or half written.
    fn restore_calibration(&mut self) -> ArmResult<()> {
        let held = self.calibration.clone();
        self.write_joint_calibration(held.as_ref())?;
        if self.torque.hold_position {
            self.bus
                .enable_torque()
                .map_err(ArmError::transport(&self.name))?;
        }
        Ok(())
    }

    pub fn connect(&mut self, calibrate: bool, operator: &mut dyn Operator) -> ArmResult<()> {
        if self.connected {
            return Err(ArmError::AlreadyConnected(self.name.clone()));
        }
        self.bus
            .connect()
            .map_err(ArmError::transport(&self.name))?;

        if let Err(e) = self.bring_up(calibrate, operator) {
            warn!("{}: connect failed, releasing the bus: {e}", self.name);
            for (name, joint) in self.joints.iter_mut() {
                if let Err(release) = joint.disconnect(&mut self.bus) {
                    debug!("{}: releasing joint {name} failed: {release}", self.name);
                }
            }
            if let Err(close) = self.bus.disconnect() {
                debug!("{}: closing the bus failed too: {close}", self.name);
            }
            return Err(e);
        }

        self.connected = true;
        info!("{} connected.", self.name);
        Ok(())
    }

    fn bring_up(&mut self, calibrate: bool, operator: &mut dyn Operator) -> ArmResult<()> {
        if self.calibration.is_none() {
            self.calibration = self.store.load()?;
        }
        self.install_calibration(self.calibration.clone())?;

        if !self.calibration_matches()? {
            if calibrate {
                self.run_calibration(operator)?;
            } else if self.calibration.is_some() {
                info!("{}: writing the stored calibration to the motors", self.name);
                let set = self.calibration.clone();
                self.write_joint_calibration(set.as_ref())?;
            } else {
                warn!(
                    "{} has no calibration; positions use the factory range",
                    self.name
                );
            }
        }

        self.configure()?;
        for (name, camera) in self.cameras.iter_mut() {
            camera.connect()?;
            debug!("{}: camera {name} connected", self.name);
        }
        Ok(())
    }

    fn calibration_matches(&mut self) -> ArmResult<bool> {
        match &self.calibration {
            Some(set) => calibration::matches_bus(&mut self.bus, set)
                .map_err(ArmError::transport(&self.name)),
            None => Ok(false),
        }
    }

    pub fn is_calibrated(&mut self) -> ArmResult<bool> {
        self.ensure_connected()?;
        self.calibration_matches()
    }

    /// Run the calibration workflow and adopt its result. A run that is
    /// aborted or fails puts the previous records back on the motors.
    pub fn run_calibration(
        &mut self,
        operator: &mut dyn Operator,
    ) -> ArmResult<CalibrationOutcome> {
        if !self.bus.is_connected() {
            return Err(ArmError::NotConnected(self.name.clone()));
        }
        let existing = self.calibration.clone();
        let mut calibrator = Calibrator::new(&self.name, existing.as_ref())
            .enable_torque_after(self.torque.hold_position);
        let outcome = match calibrator.run(&mut self.bus, existing.as_ref(), &self.store, operator)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(restore) = self.restore_calibration() {
                    warn!(
                        "{}: could not restore the previous calibration: {restore}",
                        self.name
                    );
                }
                return Err(e);
            }
        };

        match &outcome {
            CalibrationOutcome::Reused(set) | CalibrationOutcome::Recorded(set) => {
                self.install_calibration(Some(set.clone()))?;
            }
            CalibrationOutcome::Aborted { motors } => {
                warn!("{}: calibration aborted, {motors:?} never moved", self.name);
                self.restore_calibration()?;
            }
        }
        Ok(outcome)
    }

    /// Operating mode and tuning, written with torque off.
    pub fn configure(&mut self) -> ArmResult<()> {
        let transport = |source: BusError| ArmError::Transport {
            device: self.name.clone(),
            source,
        };
        let bus = &mut self.bus;
        bus.disable_torque().map_err(transport)?;

        let everyone = |value: i32| -> BTreeMap<String, i32> {
            bus.motors().keys().map(|m| (m.clone(), value)).collect()
        };
        let mut writes = vec![(Register::OperatingMode, everyone(OperatingMode::Position as i32))];
        if let Some(tuning) = &self.tuning {
            writes.push((Register::PCoefficient, everyone(tuning.p_coefficient)));
            writes.push((Register::ICoefficient, everyone(tuning.i_coefficient)));
            writes.push((Register::DCoefficient, everyone(tuning.d_coefficient)));
            if let Some(gripper) = self.gripper.as_ref().filter(|g| bus.motors().contains_key(*g)) {
                for (register, value) in [
                    (Register::MaxTorqueLimit, tuning.gripper_max_torque),
                    (Register::ProtectionCurrent, tuning.gripper_protection_current),
                    (Register::OverloadTorque, tuning.gripper_overload_torque),
                ] {
                    writes.push((register, BTreeMap::from([(gripper.clone(), value)])));
                }
            }
        }

        for (register, values) in writes {
            if bus.supports(register) {
                bus.sync_write(register, &values).map_err(transport)?;
            } else {
                debug!("{}: {register} not reachable over {}, skipped", self.name, bus.port());
            }
        }

        if self.torque.hold_position {
            bus.enable_torque().map_err(transport)?;
        }
        Ok(())
    }

    pub fn observation_features(&self) -> Features {
        let mut features = self.action_features();
        for (name, camera) in &self.cameras {
            let (h, w, c) = camera.shape();
            features.insert(name.clone(), Feature::Image(h, w, c));
        }
        features
    }

    pub fn action_features(&self) -> Features {
        self.joints
            .keys()
            .map(|joint| (position_key(joint), Feature::Position))
            .collect()
    }

    /// Present joint positions, with the side corrections undone.
    pub fn read_positions(&mut self) -> ArmResult<Action> {
        self.ensure_connected()?;
        let start = Instant::now();
        let positions =
            read_positions(&mut self.bus, &self.joints).map_err(ArmError::transport(&self.name))?;
        debug!(
            "{} read state: {:.1}ms",
            self.name,
            start.elapsed().as_secs_f64() * 1e3
        );
        Ok(positions
            .into_iter()
            .map(|(joint, v)| (position_key(&joint), v))
            .collect())
    }

    /// Joint positions and camera frames, captured concurrently.
    pub fn get_observation(&mut self) -> ArmResult<Observation> {
        self.ensure_connected()?;
        let start = Instant::now();
        let Self {
            name,
            bus,
            joints,
            cameras,
            ..
        } = self;

        let (positions, frames) = thread::scope(|s| {
            let captures: Vec<_> = cameras
                .iter_mut()
                .map(|(camera_name, camera)| {
                    (camera_name.clone(), s.spawn(move || camera.async_read()))
                })
                .collect();
            let positions = read_positions(bus, joints);
            let frames: Vec<(String, ArmResult<Frame>)> = captures
                .into_iter()
                .map(|(camera_name, handle)| {
                    let frame = handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                    (camera_name, frame)
                })
                .collect();
            (positions, frames)
        });

        let positions = positions.map_err(ArmError::transport(name.as_str()))?;
        let mut observation: Observation = positions
            .into_iter()
            .map(|(joint, v)| (position_key(&joint), ObservationValue::Position(v)))
            .collect();
        for (camera_name, frame) in frames {
            observation.insert(camera_name, ObservationValue::Image(frame?));
        }
        debug!(
            "{name} get observation: {:.1}ms",
            start.elapsed().as_secs_f64() * 1e3
        );
        Ok(observation)
    }

    /// Clamp against freshly read positions, then let every joint fan its
    /// goal out to its motors. All goals leave in one sync write per
    /// register.
    pub fn send_action(&mut self, action: &Action) -> ArmResult<Action> {
        self.ensure_connected()?;

        let mut goals = BTreeMap::new();
        for (key, value) in action {
            let joint = key
                .strip_suffix(POSITION_SUFFIX)
                .filter(|joint| self.joints.contains_key(*joint))
                .ok_or_else(|| ArmError::UnknownJoint {
                    device: self.name.clone(),
                    joint: key.clone(),
                })?;
            goals.insert(joint.to_string(), *value);
        }
        if goals.is_empty() {
            return Ok(Action::new());
        }

        let goals = match &self.max_relative_target {
            Some(max) => {
                let present = read_positions(&mut self.bus, &self.joints)
                    .map_err(ArmError::transport(&self.name))?;
                let goal_present: BTreeMap<String, (f64, f64)> = goals
                    .iter()
                    .filter_map(|(joint, goal)| {
                        present.get(joint).map(|current| (joint.clone(), (*goal, *current)))
                    })
                    .collect();
                ensure_safe_goal_position(&goal_present, max)?
            }
            None => goals,
        };

        let transport = ArmError::transport(&self.name);
        let targets: Vec<(&String, &dyn UnitActuator, f64)> = goals
            .iter()
            .filter_map(|(joint, goal)| {
                self.joints
                    .get(joint)
                    .map(|actuator| (joint, actuator.as_ref(), *goal))
            })
            .collect();

        let velocity = self.tuning.as_ref().map(|t| t.goal_velocity as f64);
        let mut batch = SyncBatch::new(&mut self.bus);
        stage_goals(&mut batch, &targets, velocity)
            .and_then(|()| batch.flush())
            .map_err(transport)?;

        // Report what the primary motor was driven to, corrections included.
        Ok(targets
            .iter()
            .map(|(joint, actuator, goal)| {
                let primary = actuator.members()[0].name();
                let driven = self
                    .orientation
                    .as_ref()
                    .map_or(*goal, |table| table.apply(primary, *goal));
                (position_key(joint), driven)
            })
            .collect())
    }

    pub fn disconnect(&mut self) -> ArmResult<()> {
        if !self.connected {
            return Err(ArmError::NotConnected(self.name.clone()));
        }

        let mut result = Ok(());
        if self.torque.disable_on_disconnect {
            result = result.and(
                self.bus
                    .disable_torque()
                    .map_err(ArmError::transport(&self.name)),
            );
        }
        for joint in self.joints.values_mut() {
            result = result.and(
                joint
                    .disconnect(&mut self.bus)
                    .map_err(ArmError::transport(&self.name)),
            );
        }
        result = result.and(self.bus.disconnect().map_err(ArmError::transport(&self.name)));
        for camera in self.cameras.values_mut() {
            result = result.and(camera.disconnect());
        }

        self.connected = false;
        info!("{} disconnected.", self.name);
        result
    }
}

/// Velocities first, so every motor already knows its speed when the
/// positions arrive.
fn stage_goals(
    batch: &mut SyncBatch<'_>,
    targets: &[(&String, &dyn UnitActuator, f64)],
    velocity: Option<f64>,
) -> Result<(), BusError> {
    if let Some(velocity) = velocity {
        for (_, actuator, _) in targets {
            actuator.write(batch, Register::GoalVelocity, velocity)?;
        }
    }
    for (_, actuator, goal) in targets {
        actuator.write(batch, Register::GoalPosition, *goal)?;
    }
    Ok(())
}

/// Joint name → position in intent space, from one sync read.
fn read_positions(
    bus: &mut dyn MotorBus,
    joints: &BTreeMap<String, Box<dyn UnitActuator>>,
) -> Result<BTreeMap<String, f64>, BusError> {
    let mut snapshot = SyncBatch::snapshot(bus)?;
    joints
        .iter()
        .map(|(joint, actuator)| {
            let position = actuator.read(&mut snapshot, Register::PresentPosition)?;
            Ok((joint.clone(), position))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::TICKS_PER_RADIAN;
    use crate::bus::SimBus;
    use crate::motor::NormMode;

    fn bus() -> SimBus {
        SimBus::new(BTreeMap::from([
            ("base".to_string(), Motor::sts3215(1, NormMode::Degrees)),
            ("link1".to_string(), Motor::sts3215(2, NormMode::Degrees)),
            ("link1_follower".to_string(), Motor::sts3215(3, NormMode::Degrees)),
        ]))
    }

    fn layout() -> BTreeMap<String, JointSpec> {
        BTreeMap::from([
            (
                "base".to_string(),
                JointSpec::Scaled {
                    id: 1,
                    scale: TICKS_PER_RADIAN,
                    offset: 2048.0,
                },
            ),
            (
                "link1".to_string(),
                JointSpec::Mirrored {
                    leader_id: 2,
                    follower_id: 3,
                },
            ),
        ])
    }

    fn store() -> CalibrationStore {
        CalibrationStore::at("/nonexistent/arm.json")
    }

    #[test]
    fn layout_must_match_the_bus() {
        assert!(Arm::new("arm", bus(), layout(), store()).is_ok());

        let mut wrong_id = layout();
        wrong_id.insert("base".to_string(), JointSpec::Normalized { id: 9 });
        assert!(matches!(
            Arm::new("arm", bus(), wrong_id, store()),
            Err(ArmError::InvalidConfiguration(_))
        ));

        let mut missing = layout();
        missing.remove("link1");
        assert!(Arm::new("arm", bus(), missing, store()).is_err());
    }

    #[test]
    fn orientation_table_must_cover_the_bus() {
        let arm = Arm::new("arm", bus(), layout(), store()).unwrap();
        let table = OrientationTable::new(
            crate::orientation::ArmSide::Left,
            BTreeMap::from([("base".to_string(), crate::orientation::Correction::Keep)]),
        );
        assert!(arm.with_orientation(table).is_err());
    }

    #[test]
    fn operations_require_a_connection() {
        let mut arm = Arm::new("arm", bus(), layout(), store()).unwrap();
        assert!(matches!(arm.get_observation(), Err(ArmError::NotConnected(_))));
        assert!(matches!(
            arm.send_action(&Action::from([("base.pos".to_string(), 0.1)])),
            Err(ArmError::NotConnected(_))
        ));
        assert!(matches!(arm.disconnect(), Err(ArmError::NotConnected(_))));
    }

    #[test]
    fn side_corrections_travel_with_the_joints() {
        use crate::calibration::ScriptedOperator;
        use crate::orientation::{ArmSide, Correction};

        let table = OrientationTable::new(
            ArmSide::Right,
            BTreeMap::from([
                ("base".to_string(), Correction::Negate),
                ("link1".to_string(), Correction::Keep),
                ("link1_follower".to_string(), Correction::Keep),
            ]),
        );
        let mut arm = Arm::new("arm", bus(), layout(), store())
            .unwrap()
            .with_orientation(table)
            .unwrap();
        assert_eq!(arm.joint("base").unwrap().members()[0].orientation(), -1.0);
        arm.connect(false, &mut ScriptedOperator::reuse()).unwrap();

        let sent = arm
            .send_action(&Action::from([("base.pos".to_string(), 0.1)]))
            .unwrap();
        assert!((sent["base.pos"] + 0.1).abs() < 1e-12);
        assert_eq!(arm.bus().register("base", Register::GoalPosition), Some(1983));

        let positions = arm.read_positions().unwrap();
        assert!((positions["base.pos"] - 0.1).abs() < 1e-3);
    }

    #[test]
    fn features_list_joints_not_motors() {
        let arm = Arm::new("arm", bus(), layout(), store()).unwrap();
        let features = arm.action_features();
        assert_eq!(
            features.keys().collect::<Vec<_>>(),
            vec!["base.pos", "link1.pos"]
        );
    }
}
