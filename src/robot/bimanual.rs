//! Two single arms presented as one device, keys namespaced by side.

use log::info;
use std::collections::BTreeMap;

use super::{Action, Device, Features, Observation, Robot, Teleoperator};
use crate::calibration::Operator;
use crate::error::{ArmError, ArmResult};
use crate::orientation::ArmSide;

fn prefixed<V>(side: ArmSide, map: BTreeMap<String, V>) -> impl Iterator<Item = (String, V)> {
    map.into_iter()
        .map(move |(key, value)| (format!("{side}_{key}"), value))
}

fn merged<V>(left: BTreeMap<String, V>, right: BTreeMap<String, V>) -> BTreeMap<String, V> {
    prefixed(ArmSide::Left, left)
        .chain(prefixed(ArmSide::Right, right))
        .collect()
}

/// A left and a right arm, each built and configured on its own.
pub struct Bimanual<A> {
    name: String,
    left: A,
    right: A,
}

impl<A> Bimanual<A> {
    pub fn new(name: &str, left: A, right: A) -> Self {
        Self {
            name: name.to_string(),
            left,
            right,
        }
    }

    pub fn left(&self) -> &A {
        &self.left
    }

    pub fn right(&self) -> &A {
        &self.right
    }

    pub fn left_mut(&mut self) -> &mut A {
        &mut self.left
    }

    pub fn right_mut(&mut self) -> &mut A {
        &mut self.right
    }

    /// Route `left_*` / `right_*` keys to their arm, prefix stripped.
    fn split(&self, action: &Action) -> ArmResult<(Action, Action)> {
        let mut left = Action::new();
        let mut right = Action::new();
        for (key, value) in action {
            if let Some(joint) = key.strip_prefix("left_") {
                left.insert(joint.to_string(), *value);
            } else if let Some(joint) = key.strip_prefix("right_") {
                right.insert(joint.to_string(), *value);
            } else {
                return Err(ArmError::UnknownJoint {
                    device: self.name.clone(),
                    joint: key.clone(),
                });
            }
        }
        Ok((left, right))
    }
}

impl<A: Device> Device for Bimanual<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.left.is_connected() && self.right.is_connected()
    }

    /// Both arms are attempted; the first failure is reported.
    fn connect(&mut self, calibrate: bool, operator: &mut dyn Operator) -> ArmResult<()> {
        let left = self.left.connect(calibrate, operator);
        let right = self.right.connect(calibrate, operator);
        left.and(right)?;
        info!("{} connected.", self.name);
        Ok(())
    }

    fn disconnect(&mut self) -> ArmResult<()> {
        let left = self.left.disconnect();
        let right = self.right.disconnect();
        left.and(right)
    }

    fn is_calibrated(&mut self) -> ArmResult<bool> {
        Ok(self.left.is_calibrated()? && self.right.is_calibrated()?)
    }

    fn calibrate(&mut self, operator: &mut dyn Operator) -> ArmResult<()> {
        let left = self.left.calibrate(operator);
        let right = self.right.calibrate(operator);
        left.and(right)
    }
}

impl<A: Robot> Robot for Bimanual<A> {
    fn observation_features(&self) -> Features {
        merged(
            self.left.observation_features(),
            self.right.observation_features(),
        )
    }

    fn action_features(&self) -> Features {
        merged(self.left.action_features(), self.right.action_features())
    }

    fn get_observation(&mut self) -> ArmResult<Observation> {
        let left = self.left.get_observation()?;
        let right = self.right.get_observation()?;
        Ok(merged(left, right))
    }

    fn send_action(&mut self, action: &Action) -> ArmResult<Action> {
        let (left, right) = self.split(action)?;
        let left = self.left.send_action(&left)?;
        let right = self.right.send_action(&right)?;
        Ok(merged(left, right))
    }
}

impl<A: Teleoperator> Teleoperator for Bimanual<A> {
    fn action_features(&self) -> Features {
        merged(self.left.action_features(), self.right.action_features())
    }

    fn feedback_features(&self) -> Features {
        merged(
            self.left.feedback_features(),
            self.right.feedback_features(),
        )
    }

    fn get_action(&mut self) -> ArmResult<Action> {
        let left = self.left.get_action()?;
        let right = self.right.get_action()?;
        Ok(merged(left, right))
    }

    fn send_feedback(&mut self, feedback: &Action) -> ArmResult<()> {
        let (left, right) = self.split(feedback)?;
        self.left.send_feedback(&left)?;
        self.right.send_feedback(&right)
    }
}
