mod common;

use std::path::Path;

use umbra_arm::bus::{MotorBus, Register, SimBus};
use umbra_arm::calibration::ScriptedOperator;
use umbra_arm::config::{BimanualConfig, SideConfig};
use umbra_arm::orientation::ArmSide;
use umbra_arm::robot::umbra::{FOLLOWER_KIND, LEADER_KIND, follower_motors, leader_motors};
use umbra_arm::robot::{Bimanual, UmbraFollower, UmbraLeader, positions};
use umbra_arm::safety::MaxRelativeTarget;
use umbra_arm::{Action, ArmError, Device, Robot, Teleoperator};

use common::{assert_close, calibration_for, save_calibration};

fn config(dir: &Path) -> BimanualConfig {
    BimanualConfig {
        id: "bi_test".to_string(),
        calibration_dir: dir.to_path_buf(),
        left: SideConfig {
            port: "sim-left".to_string(),
            ..SideConfig::default()
        },
        right: SideConfig {
            port: "sim-right".to_string(),
            max_relative_target: Some(MaxRelativeTarget::Uniform(5.0)),
            ..SideConfig::default()
        },
        ..BimanualConfig::default()
    }
}

fn followers(config: &BimanualConfig) -> Bimanual<UmbraFollower<SimBus>> {
    let arm = |side: ArmSide| {
        let motors = follower_motors(false);
        save_calibration(
            &config.calibration_dir,
            FOLLOWER_KIND,
            &config.arm_id(side),
            &calibration_for(&motors),
        );
        UmbraFollower::with_bus(&config.follower(side), SimBus::new(motors)).unwrap()
    };
    Bimanual::new(&config.id, arm(ArmSide::Left), arm(ArmSide::Right))
}

fn leaders(config: &BimanualConfig) -> Bimanual<UmbraLeader<SimBus>> {
    let arm = |side: ArmSide| {
        let motors = leader_motors(false);
        save_calibration(
            &config.calibration_dir,
            LEADER_KIND,
            &config.arm_id(side),
            &calibration_for(&motors),
        );
        UmbraLeader::with_bus(&config.leader(side), SimBus::new(motors)).unwrap()
    };
    Bimanual::new(&config.id, arm(ArmSide::Left), arm(ArmSide::Right))
}

fn action(pairs: &[(&str, f64)]) -> Action {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn each_arm_keeps_its_own_calibration_file() {
    let dir = tempfile::tempdir().unwrap();
    let pair = followers(&config(dir.path()));
    assert!(
        pair.left()
            .arm()
            .store()
            .path()
            .ends_with("umbra_follower/bi_test_left.json")
    );
    assert!(
        pair.right()
            .arm()
            .store()
            .path()
            .ends_with("umbra_follower/bi_test_right.json")
    );
    assert_eq!(pair.left().side(), ArmSide::Left);
    assert_eq!(pair.right().side(), ArmSide::Right);
}

#[test]
fn observation_keys_carry_the_side() {
    let dir = tempfile::tempdir().unwrap();
    let mut pair = followers(&config(dir.path()));
    pair.connect(false, &mut ScriptedOperator::reuse()).unwrap();
    assert!(pair.is_connected());

    let observation = pair.get_observation().unwrap();
    assert_eq!(observation.len(), 14);
    assert!(observation.contains_key("left_link2.pos"));
    assert!(observation.contains_key("right_gripper.pos"));
    assert!(
        observation
            .keys()
            .all(|k| k.starts_with("left_") || k.starts_with("right_"))
    );
    assert_eq!(
        Robot::action_features(&pair).keys().collect::<Vec<_>>(),
        observation.keys().collect::<Vec<_>>()
    );

    pair.disconnect().unwrap();
    assert!(!pair.left().arm().bus().is_connected());
    assert!(!pair.right().arm().bus().is_connected());
}

#[test]
fn actions_are_routed_by_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut pair = followers(&config(dir.path()));
    pair.connect(false, &mut ScriptedOperator::reuse()).unwrap();

    pair.right_mut().arm_mut().bus_mut().clear_writes();
    let sent = pair
        .send_action(&action(&[("left_base.pos", 10.0), ("left_link1.pos", 3.0)]))
        .unwrap();
    assert_eq!(
        sent.keys().collect::<Vec<_>>(),
        vec!["left_base.pos", "left_link1.pos"]
    );
    assert_eq!(
        pair.left().arm().bus().register("base", Register::GoalPosition),
        Some(2100)
    );
    assert!(pair.right().arm().bus().writes().is_empty());
}

#[test]
fn unprefixed_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut pair = followers(&config(dir.path()));
    pair.connect(false, &mut ScriptedOperator::reuse()).unwrap();
    pair.left_mut().arm_mut().bus_mut().clear_writes();

    assert!(matches!(
        pair.send_action(&action(&[("left_base.pos", 1.0), ("base.pos", 1.0)])),
        Err(ArmError::UnknownJoint { .. })
    ));
    assert!(pair.left().arm().bus().writes().is_empty());
}

#[test]
fn clamps_apply_per_side() {
    let dir = tempfile::tempdir().unwrap();
    let mut pair = followers(&config(dir.path()));
    pair.connect(false, &mut ScriptedOperator::reuse()).unwrap();

    // Both bases rest at 2048 ticks, 4.8 units past the middle.
    let sent = pair
        .send_action(&action(&[("left_base.pos", 50.0), ("right_base.pos", 50.0)]))
        .unwrap();
    assert_close(sent["left_base.pos"], 50.0);
    assert_close(sent["right_base.pos"], 9.8);
    assert_eq!(
        pair.left().arm().bus().register("base", Register::GoalPosition),
        Some(2500)
    );
    assert_eq!(
        pair.right().arm().bus().register("base", Register::GoalPosition),
        Some(2098)
    );
}

#[test]
fn mirrored_sides_follow_their_own_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.right.max_relative_target = None;
    let mut pair = followers(&config);
    pair.connect(false, &mut ScriptedOperator::reuse()).unwrap();

    let sent = pair
        .send_action(&action(&[("left_link1.pos", 8.0), ("right_link1.pos", 8.0)]))
        .unwrap();
    assert_close(sent["left_link1.pos"], 8.0);
    assert_close(sent["right_link1.pos"], -8.0);
    let goal = |arm: &UmbraFollower<SimBus>, motor: &str| {
        arm.arm().bus().register(motor, Register::GoalPosition).unwrap()
    };
    assert_eq!(goal(pair.left(), "link1"), 2080);
    assert_eq!(goal(pair.left(), "link1_follower"), 2015);
    assert_eq!(goal(pair.right(), "link1"), 1920);
    assert_eq!(goal(pair.right(), "link1_follower"), 2175);
}

#[test]
fn leader_pair_produces_one_prefixed_action() {
    let dir = tempfile::tempdir().unwrap();
    let mut pair = leaders(&config(dir.path()));
    pair.connect(false, &mut ScriptedOperator::reuse()).unwrap();
    pair.left_mut().arm_mut().bus_mut().set_physical("base", 2010);
    pair.right_mut().arm_mut().bus_mut().set_physical("base", 2020);

    let step = pair.get_action().unwrap();
    assert_eq!(step.len(), 14);
    assert_close(step["left_base.pos"], 1.0);
    assert_close(step["right_base.pos"], 2.0);

    assert!(pair.send_feedback(&Action::new()).is_ok());
    assert!(matches!(
        pair.send_feedback(&action(&[("left_base.pos", 1.0)])),
        Err(ArmError::UnsupportedFeedback { .. })
    ));
}

#[test]
fn leader_action_drives_follower_pair() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut leader = leaders(&config);
    let mut follower = followers(&config);
    leader.connect(false, &mut ScriptedOperator::reuse()).unwrap();
    follower.connect(false, &mut ScriptedOperator::reuse()).unwrap();

    leader.left_mut().arm_mut().bus_mut().set_physical("link3", 2030);
    let step = leader.get_action().unwrap();
    follower.send_action(&step).unwrap();
    assert_eq!(
        follower.left().arm().bus().register("link3", Register::GoalPosition),
        Some(2030)
    );

    let observed = positions(&follower.get_observation().unwrap());
    assert_close(observed["left_link3.pos"], 3.0);
}

#[test]
fn one_failing_arm_does_not_strand_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let mut pair = followers(&config(dir.path()));
    pair.right_mut().arm_mut().bus_mut().refuse_connect(true);

    assert!(matches!(
        pair.connect(false, &mut ScriptedOperator::reuse()),
        Err(ArmError::Transport { .. })
    ));
    assert!(pair.left().is_connected());
    assert!(!pair.is_connected());

    assert!(matches!(pair.disconnect(), Err(ArmError::NotConnected(_))));
    assert!(!pair.left().is_connected());
    assert!(!pair.left().arm().bus().is_connected());
}
