//! The Umbra arm family: a nine-motor follower with two mirrored joints and
//! a seven-motor leader moved by hand.

use std::collections::BTreeMap;

use super::arm::{Arm, JointSpec, TorquePolicy};
use super::bimanual::Bimanual;
use super::{Action, Device, Features, Observation, Robot, Teleoperator};
use crate::bus::{FeetechBus, MotorBus};
use crate::calibration::{CalibrationStore, Operator};
use crate::camera::Camera;
use crate::config::{BimanualConfig, FollowerConfig, GripperConfig, LeaderConfig};
use crate::error::{ArmError, ArmResult};
use crate::motor::{Motor, NormMode};
use crate::orientation::{ArmSide, Correction, OrientationTable};

pub const FOLLOWER_KIND: &str = "umbra_follower";
pub const LEADER_KIND: &str = "umbra_leader";

fn body_mode(use_degrees: bool) -> NormMode {
    if use_degrees {
        NormMode::Degrees
    } else {
        NormMode::RangeM100_100
    }
}

fn motor_table(entries: &[(&str, u8, NormMode)]) -> BTreeMap<String, Motor> {
    entries
        .iter()
        .map(|(name, id, mode)| (name.to_string(), Motor::sts3215(*id, *mode)))
        .collect()
}

pub fn follower_motors(use_degrees: bool) -> BTreeMap<String, Motor> {
    let body = body_mode(use_degrees);
    motor_table(&[
        ("base", 1, body),
        ("link1", 2, body),
        ("link1_follower", 3, body),
        ("link2", 4, body),
        ("link2_follower", 5, body),
        ("link3", 6, body),
        ("link4", 7, body),
        ("link5", 8, body),
        ("gripper", 9, NormMode::Range0_100),
    ])
}

pub fn follower_layout(gripper: &GripperConfig) -> BTreeMap<String, JointSpec> {
    let gripper = match gripper {
        GripperConfig::Percent => JointSpec::Normalized { id: 9 },
        GripperConfig::Linear {
            min_dist,
            max_dist,
            min_ticks,
            max_ticks,
        } => JointSpec::Linear {
            id: 9,
            min_dist: *min_dist,
            max_dist: *max_dist,
            min_ticks: *min_ticks,
            max_ticks: *max_ticks,
        },
    };
    BTreeMap::from([
        ("base".to_string(), JointSpec::Normalized { id: 1 }),
        (
            "link1".to_string(),
            JointSpec::Mirrored {
                leader_id: 2,
                follower_id: 3,
            },
        ),
        (
            "link2".to_string(),
            JointSpec::Mirrored {
                leader_id: 4,
                follower_id: 5,
            },
        ),
        ("link3".to_string(), JointSpec::Normalized { id: 6 }),
        ("link4".to_string(), JointSpec::Normalized { id: 7 }),
        ("link5".to_string(), JointSpec::Normalized { id: 8 }),
        ("gripper".to_string(), gripper),
    ])
}

pub fn leader_motors(use_degrees: bool) -> BTreeMap<String, Motor> {
    let body = body_mode(use_degrees);
    motor_table(&[
        ("base", 1, body),
        ("link1", 2, body),
        ("link2", 3, body),
        ("link3", 4, body),
        ("link4", 5, body),
        ("link5", 6, body),
        ("gripper", 7, NormMode::Range0_100),
    ])
}

pub fn leader_layout() -> BTreeMap<String, JointSpec> {
    leader_motors(false)
        .into_iter()
        .map(|(name, m)| (name, JointSpec::Normalized { id: m.id }))
        .collect()
}

/// Side table for the follower. A reflected gripper is mirrored around the
/// middle of its travel, whatever unit the gripper uses.
fn follower_orientation(side: ArmSide, config: &FollowerConfig) -> OrientationTable {
    let mut table = OrientationTable::umbra(side);
    if let GripperConfig::Linear {
        min_dist, max_dist, ..
    } = config.gripper
        && matches!(table.rule("gripper"), Correction::Reflect(_))
    {
        let middle = Correction::Reflect((min_dist + max_dist) / 2.0);
        table = table.with_overrides(&BTreeMap::from([("gripper".to_string(), middle)]));
    }
    table.with_overrides(&config.orientation)
}

/// Commanded arm. Holds torque while connected.
pub struct UmbraFollower<B: MotorBus = FeetechBus> {
    arm: Arm<B>,
    side: ArmSide,
}

impl UmbraFollower<FeetechBus> {
    pub fn new(config: &FollowerConfig) -> ArmResult<Self> {
        let bus = FeetechBus::new(&config.port, follower_motors(config.use_degrees));
        Self::with_bus(config, bus)
    }
}

impl<B: MotorBus> UmbraFollower<B> {
    /// `bus` must carry the motors of [`follower_motors`].
    pub fn with_bus(config: &FollowerConfig, bus: B) -> ArmResult<Self> {
        let side = config.validate()?;
        let store = CalibrationStore::new(&config.calibration_dir, FOLLOWER_KIND, &config.id);
        let arm = Arm::new(&config.id, bus, follower_layout(&config.gripper), store)?
            .with_orientation(follower_orientation(side, config))?
            .with_max_relative_target(config.max_relative_target.clone())?
            .with_torque_policy(TorquePolicy::follower(config.disable_torque_on_disconnect))
            .with_tuning(config.tuning.clone(), Some("gripper"));
        Ok(Self { arm, side })
    }

    pub fn with_camera(mut self, name: &str, camera: Box<dyn Camera>) -> Self {
        self.arm = self.arm.with_camera(name, camera);
        self
    }

    pub fn side(&self) -> ArmSide {
        self.side
    }

    pub fn arm(&self) -> &Arm<B> {
        &self.arm
    }

    pub fn arm_mut(&mut self) -> &mut Arm<B> {
        &mut self.arm
    }
}

impl<B: MotorBus> Device for UmbraFollower<B> {
    fn name(&self) -> &str {
        self.arm.name()
    }

    fn is_connected(&self) -> bool {
        self.arm.is_connected()
    }

    fn connect(&mut self, calibrate: bool, operator: &mut dyn Operator) -> ArmResult<()> {
        self.arm.connect(calibrate, operator)
    }

    fn disconnect(&mut self) -> ArmResult<()> {
        self.arm.disconnect()
    }

    fn is_calibrated(&mut self) -> ArmResult<bool> {
        self.arm.is_calibrated()
    }

    fn calibrate(&mut self, operator: &mut dyn Operator) -> ArmResult<()> {
        self.arm.run_calibration(operator).map(|_| ())
    }
}

impl<B: MotorBus> Robot for UmbraFollower<B> {
    fn observation_features(&self) -> Features {
        self.arm.observation_features()
    }

    fn action_features(&self) -> Features {
        self.arm.action_features()
    }

    fn get_observation(&mut self) -> ArmResult<Observation> {
        self.arm.get_observation()
    }

    fn send_action(&mut self, action: &Action) -> ArmResult<Action> {
        self.arm.send_action(action)
    }
}

/// Hand-guided arm read as an action source. Torque stays off.
pub struct UmbraLeader<B: MotorBus = FeetechBus> {
    arm: Arm<B>,
}

impl UmbraLeader<FeetechBus> {
    pub fn new(config: &LeaderConfig) -> ArmResult<Self> {
        let bus = FeetechBus::new(&config.port, leader_motors(config.use_degrees));
        Self::with_bus(config, bus)
    }
}

impl<B: MotorBus> UmbraLeader<B> {
    /// `bus` must carry the motors of [`leader_motors`].
    pub fn with_bus(config: &LeaderConfig, bus: B) -> ArmResult<Self> {
        config.validate()?;
        let store = CalibrationStore::new(&config.calibration_dir, LEADER_KIND, &config.id);
        let arm = Arm::new(&config.id, bus, leader_layout(), store)?
            .with_torque_policy(TorquePolicy::leader(config.disable_torque_on_disconnect));
        Ok(Self { arm })
    }

    pub fn arm(&self) -> &Arm<B> {
        &self.arm
    }

    pub fn arm_mut(&mut self) -> &mut Arm<B> {
        &mut self.arm
    }
}

impl<B: MotorBus> Device for UmbraLeader<B> {
    fn name(&self) -> &str {
        self.arm.name()
    }

    fn is_connected(&self) -> bool {
        self.arm.is_connected()
    }

    fn connect(&mut self, calibrate: bool, operator: &mut dyn Operator) -> ArmResult<()> {
        self.arm.connect(calibrate, operator)
    }

    fn disconnect(&mut self) -> ArmResult<()> {
        self.arm.disconnect()
    }

    fn is_calibrated(&mut self) -> ArmResult<bool> {
        self.arm.is_calibrated()
    }

    fn calibrate(&mut self, operator: &mut dyn Operator) -> ArmResult<()> {
        self.arm.run_calibration(operator).map(|_| ())
    }
}

impl<B: MotorBus> Teleoperator for UmbraLeader<B> {
    fn action_features(&self) -> Features {
        self.arm.action_features()
    }

    fn feedback_features(&self) -> Features {
        Features::new()
    }

    fn get_action(&mut self) -> ArmResult<Action> {
        self.arm.read_positions()
    }

    /// The leader has no actuated feedback; only an empty map is accepted.
    fn send_feedback(&mut self, feedback: &Action) -> ArmResult<()> {
        if feedback.is_empty() {
            return Ok(());
        }
        Err(ArmError::UnsupportedFeedback {
            device: self.arm.name().to_string(),
            keys: feedback.keys().cloned().collect(),
        })
    }
}

pub fn bimanual_follower(config: &BimanualConfig) -> ArmResult<Bimanual<UmbraFollower>> {
    Ok(Bimanual::new(
        &config.id,
        UmbraFollower::new(&config.follower(ArmSide::Left))?,
        UmbraFollower::new(&config.follower(ArmSide::Right))?,
    ))
}

pub fn bimanual_leader(config: &BimanualConfig) -> ArmResult<Bimanual<UmbraLeader>> {
    Ok(Bimanual::new(
        &config.id,
        UmbraLeader::new(&config.leader(ArmSide::Left))?,
        UmbraLeader::new(&config.leader(ArmSide::Right))?,
    ))
}
