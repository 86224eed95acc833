//! Caller-facing device roles.
//!
//! A [`Robot`] is commanded and observed; a [`Teleoperator`] is moved by
//! hand and read as an action source. Both share the connection and
//! calibration lifecycle of [`Device`].

pub mod arm;
pub mod bimanual;
pub mod umbra;

use std::collections::BTreeMap;

use crate::calibration::Operator;
use crate::camera::Frame;
use crate::error::ArmResult;

pub use arm::{Arm, JointSpec, TorquePolicy};
pub use bimanual::Bimanual;
pub use umbra::{UmbraFollower, UmbraLeader};

/// Suffix of every joint position key, e.g. `base.pos`.
pub const POSITION_SUFFIX: &str = ".pos";

pub fn position_key(joint: &str) -> String {
    format!("{joint}{POSITION_SUFFIX}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// A joint position in user units.
    Position,
    /// A camera frame of this (height, width, channels).
    Image(usize, usize, usize),
}

pub type Features = BTreeMap<String, Feature>;

/// Joint name + `.pos` → user-unit position.
pub type Action = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub enum ObservationValue {
    Position(f64),
    Image(Frame),
}

impl ObservationValue {
    pub fn as_position(&self) -> Option<f64> {
        match self {
            ObservationValue::Position(v) => Some(*v),
            ObservationValue::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&Frame> {
        match self {
            ObservationValue::Image(frame) => Some(frame),
            ObservationValue::Position(_) => None,
        }
    }
}

pub type Observation = BTreeMap<String, ObservationValue>;

/// Keep only the joint positions of an observation, e.g. to hold the
/// observed pose with `send_action`.
pub fn positions(observation: &Observation) -> Action {
    observation
        .iter()
        .filter_map(|(key, value)| value.as_position().map(|v| (key.clone(), v)))
        .collect()
}

pub trait Device {
    /// Identity of this device, also its calibration file name.
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Open the transport. With `calibrate`, a device whose motors do not
    /// hold its stored calibration asks `operator` how to proceed.
    fn connect(&mut self, calibrate: bool, operator: &mut dyn Operator) -> ArmResult<()>;

    /// Release the transport. Every step is attempted even if one fails.
    fn disconnect(&mut self) -> ArmResult<()>;

    fn is_calibrated(&mut self) -> ArmResult<bool>;

    fn calibrate(&mut self, operator: &mut dyn Operator) -> ArmResult<()>;
}

pub trait Robot: Device {
    fn observation_features(&self) -> Features;

    fn action_features(&self) -> Features;

    fn get_observation(&mut self) -> ArmResult<Observation>;

    /// Command goal positions. Returns the goals actually sent, after the
    /// safety clamp and side corrections.
    fn send_action(&mut self, action: &Action) -> ArmResult<Action>;
}

pub trait Teleoperator: Device {
    fn action_features(&self) -> Features;

    fn feedback_features(&self) -> Features;

    fn get_action(&mut self) -> ArmResult<Action>;

    fn send_feedback(&mut self, feedback: &Action) -> ArmResult<()>;
}
