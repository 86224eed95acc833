use crate::actuator::{ScaledActuator, UnitActuator};
use crate::bus::{MotorBus, Register};
use crate::error::{ArmError, BusError};
use crate::motor::MAX_TICK;
use crate::orientation::OrientationTable;

/// Two motors driving one joint from opposite sides.
///
/// The follower shares the leader's scale but runs with orientation -1 and
/// a zero point of `MAX_TICK - leader_offset`, so one user-unit command
/// turns the two motors in opposite raw directions.
#[derive(Debug, Clone)]
pub struct MirroredJoint {
    name: String,
    members: [ScaledActuator; 2],
}

impl MirroredJoint {
    pub fn new(
        name: &str,
        leader_id: u8,
        follower_id: u8,
        scale: f64,
        offset: f64,
    ) -> Result<Self, ArmError> {
        let leader = ScaledActuator::new(name, leader_id, scale, offset)?;
        Self::from_leader(leader, follower_id)
    }

    /// Derive the mirrored follower from an already configured leader.
    pub fn from_leader(leader: ScaledActuator, follower_id: u8) -> Result<Self, ArmError> {
        let name = leader.name().to_string();
        if leader.id() == follower_id {
            return Err(ArmError::InvalidConfiguration(format!(
                "mirrored joint '{name}': leader and follower share id {follower_id}"
            )));
        }
        let follower = ScaledActuator::new(
            &format!("{name}_follower"),
            follower_id,
            leader.scale(),
            MAX_TICK as f64 - leader.offset(),
        )?
        .reversed();
        Ok(Self {
            name,
            members: [leader, follower],
        })
    }

    pub fn leader(&self) -> &ScaledActuator {
        &self.members[0]
    }

    pub fn follower(&self) -> &ScaledActuator {
        &self.members[1]
    }
}

impl UnitActuator for MirroredJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> &[ScaledActuator] {
        &self.members
    }

    /// Each member follows its own rule; a follower's sign convention can
    /// differ from its leader's.
    fn apply_orientation(&mut self, table: &OrientationTable) {
        for member in &mut self.members {
            let rule = table.rule(member.name());
            member.correct(rule);
        }
    }

    /// Average of both members, absorbing mechanical slack.
    fn combine(&self, member_values: &[f64]) -> f64 {
        if member_values.is_empty() {
            return 0.0;
        }
        member_values.iter().sum::<f64>() / member_values.len() as f64
    }

    fn connect(&mut self, bus: &mut dyn MotorBus) -> Result<(), BusError> {
        let [leader, follower] = &mut self.members;
        leader.connect(bus)?;
        if let Err(e) = follower.connect(bus) {
            leader.disconnect(bus)?;
            return Err(e);
        }
        Ok(())
    }

    fn disconnect(&mut self, bus: &mut dyn MotorBus) -> Result<(), BusError> {
        let [leader, follower] = &mut self.members;
        let first = leader.disconnect(bus);
        let second = follower.disconnect(bus);
        first.and(second)
    }

    fn read(&self, bus: &mut dyn MotorBus, register: Register) -> Result<f64, BusError> {
        let leader = self.members[0].read(bus, register)?;
        if register != Register::PresentPosition {
            return Ok(leader);
        }
        let follower = self.members[1].read(bus, register)?;
        Ok(self.combine(&[leader, follower]))
    }

    fn write(
        &self,
        bus: &mut dyn MotorBus,
        register: Register,
        value: f64,
    ) -> Result<(), BusError> {
        for member in &self.members {
            member.write(bus, register, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::TICKS_PER_RADIAN;
    use crate::bus::SimBus;
    use crate::motor::{Motor, MotorCalibration, NormMode};
    use crate::orientation::{ArmSide, Correction};
    use std::collections::BTreeMap;

    fn pair() -> (MirroredJoint, SimBus) {
        let joint = MirroredJoint::new("link1", 2, 3, TICKS_PER_RADIAN, 2048.0).unwrap();
        let motors = BTreeMap::from([
            ("link1".to_string(), Motor::sts3215(2, NormMode::Degrees)),
            ("link1_follower".to_string(), Motor::sts3215(3, NormMode::Degrees)),
        ]);
        (joint, SimBus::new(motors))
    }

    #[test]
    fn follower_is_mirrored_around_the_leader_offset() {
        let (joint, _) = pair();
        assert_eq!(joint.follower().offset(), 2047.0);
        assert_eq!(joint.follower().orientation(), -1.0);
        assert_eq!(joint.follower().name(), "link1_follower");

        let v = 0.4;
        let step = v * TICKS_PER_RADIAN;
        assert_eq!(joint.leader().to_device(v), (2048.0 + step).round() as i32);
        assert_eq!(joint.follower().to_device(v), (2047.0 - step).round() as i32);
    }

    #[test]
    fn write_fans_out_and_read_averages() {
        let (mut joint, mut bus) = pair();
        bus.connect().unwrap();
        joint.connect(&mut bus).unwrap();
        assert!(joint.is_connected());

        joint.write(&mut bus, Register::GoalPosition, 0.5).unwrap();
        assert_eq!(bus.register("link1", Register::GoalPosition), Some(2374));
        assert_eq!(bus.register("link1_follower", Register::GoalPosition), Some(1721));

        // A couple of ticks of slack on the follower averages out.
        bus.set_physical("link1_follower", 1723);
        let pos = joint.read(&mut bus, Register::PresentPosition).unwrap();
        let leader = joint.leader().from_device(2374);
        let follower = joint.follower().from_device(1723);
        assert!((pos - (leader + follower) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn non_position_reads_come_from_the_leader() {
        let (joint, mut bus) = pair();
        bus.connect().unwrap();
        bus.write(Register::GoalVelocity, 2, 300).unwrap();
        bus.write(Register::GoalVelocity, 3, 100).unwrap();
        assert_eq!(joint.read(&mut bus, Register::GoalVelocity).unwrap(), 300.0);
    }

    #[test]
    fn connect_is_all_or_nothing() {
        let motors = BTreeMap::from([("link1".to_string(), Motor::sts3215(2, NormMode::Degrees))]);
        let mut bus = SimBus::new(motors);
        bus.connect().unwrap();
        let mut joint = MirroredJoint::new("link1", 2, 3, TICKS_PER_RADIAN, 2048.0).unwrap();

        assert!(joint.connect(&mut bus).is_err());
        assert!(!joint.is_connected());
        assert!(!joint.leader().is_connected());
    }

    #[test]
    fn calibrate_writes_each_member_record() {
        let (joint, mut bus) = pair();
        bus.connect().unwrap();
        let record = |id, homing_offset, range_min, range_max| MotorCalibration {
            id,
            drive_mode: 0,
            homing_offset,
            range_min,
            range_max,
        };
        let mut set = BTreeMap::from([
            ("link1".to_string(), record(2, 12, 700, 3300)),
            ("link1_follower".to_string(), record(3, -40, 800, 3400)),
        ]);

        joint.calibrate(&mut bus, &set).unwrap();
        assert_eq!(bus.register("link1", Register::HomingOffset), Some(12));
        assert_eq!(bus.register("link1", Register::MaxPositionLimit), Some(3300));
        assert_eq!(bus.register("link1_follower", Register::HomingOffset), Some(-40));
        assert_eq!(bus.register("link1_follower", Register::MinPositionLimit), Some(800));

        set.remove("link1_follower");
        assert!(matches!(
            joint.calibrate(&mut bus, &set),
            Err(BusError::UnknownMotor(name)) if name == "link1_follower"
        ));
    }

    #[test]
    fn follower_takes_its_own_side_correction() {
        let (mut joint, _) = pair();
        let table = OrientationTable::new(
            ArmSide::Right,
            BTreeMap::from([
                ("link1".to_string(), Correction::Negate),
                ("link1_follower".to_string(), Correction::Keep),
            ]),
        );
        joint.apply_orientation(&table);
        assert_eq!(joint.leader().orientation(), -1.0);
        assert_eq!(joint.follower().orientation(), -1.0);
        assert_eq!(joint.leader().to_device(0.5), joint.follower().to_device(0.5) + 1);
    }

    #[test]
    fn rejects_shared_ids() {
        assert!(MirroredJoint::new("link1", 2, 2, TICKS_PER_RADIAN, 2048.0).is_err());
    }
}
