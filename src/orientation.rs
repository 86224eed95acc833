//! Side-dependent sign conventions of mirrored arm assemblies.
//!
//! A left and a right arm are mechanical mirror images, so some axes turn
//! the other way. The table maps every motor of an arm to a correction that
//! is applied to outgoing goals just before transmission. All corrections
//! are their own inverse, so the same table also maps readings back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ArmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmSide {
    Left,
    Right,
}

impl ArmSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmSide::Left => "left",
            ArmSide::Right => "right",
        }
    }
}

impl FromStr for ArmSide {
    type Err = ArmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(ArmSide::Left),
            "right" => Ok(ArmSide::Right),
            other => Err(ArmError::InvalidConfiguration(format!(
                "arm_side must be 'left' or 'right', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ArmSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    Keep,
    Negate,
    /// Mirror around a point, e.g. `x -> 100 - x` is `Reflect(50.0)`.
    Reflect(f64),
}

impl Correction {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Correction::Keep => value,
            Correction::Negate => -value,
            Correction::Reflect(about) => 2.0 * about - value,
        }
    }
}

/// Motor name → correction, covering every motor of one arm.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationTable {
    side: ArmSide,
    rules: BTreeMap<String, Correction>,
}

impl OrientationTable {
    pub fn new(side: ArmSide, rules: BTreeMap<String, Correction>) -> Self {
        Self { side, rules }
    }

    /// Conventions of the Umbra follower arm.
    pub fn umbra(side: ArmSide) -> Self {
        use Correction::*;
        let rules: &[(&str, Correction)] = match side {
            ArmSide::Left => &[
                ("base", Keep),
                ("link1", Keep),
                ("link1_follower", Keep),
                ("link2", Negate),
                ("link2_follower", Negate),
                ("link3", Keep),
                ("link4", Negate),
                ("link5", Keep),
                ("gripper", Reflect(50.0)),
            ],
            ArmSide::Right => &[
                ("base", Keep),
                ("link1", Negate),
                ("link1_follower", Negate),
                ("link2", Negate),
                ("link2_follower", Negate),
                ("link3", Keep),
                ("link4", Negate),
                ("link5", Keep),
                ("gripper", Keep),
            ],
        };
        Self::new(
            side,
            rules.iter().map(|(m, c)| (m.to_string(), *c)).collect(),
        )
    }

    /// Replace individual rules, e.g. from configuration.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Correction>) -> Self {
        for (motor, rule) in overrides {
            self.rules.insert(motor.clone(), *rule);
        }
        self
    }

    pub fn side(&self) -> ArmSide {
        self.side
    }

    /// The table must name exactly the motors of the arm, no more, no less.
    pub fn validate<'a>(&self, motors: impl IntoIterator<Item = &'a str>) -> Result<(), ArmError> {
        let motors: Vec<&str> = motors.into_iter().collect();
        let missing: Vec<&str> = motors
            .iter()
            .copied()
            .filter(|m| !self.rules.contains_key(*m))
            .collect();
        let unknown: Vec<&str> = self
            .rules
            .keys()
            .map(String::as_str)
            .filter(|r| !motors.contains(r))
            .collect();
        if missing.is_empty() && unknown.is_empty() {
            return Ok(());
        }
        Err(ArmError::InvalidConfiguration(format!(
            "{} orientation table: no rule for {missing:?}, rules for unknown motors {unknown:?}",
            self.side
        )))
    }

    pub fn rule(&self, motor: &str) -> Correction {
        self.rules.get(motor).copied().unwrap_or(Correction::Keep)
    }

    pub fn apply(&self, motor: &str, value: f64) -> f64 {
        self.rule(motor).apply(value)
    }

    pub fn correct(&self, goals: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        goals
            .iter()
            .map(|(motor, v)| (motor.clone(), self.apply(motor, *v)))
            .collect()
    }
}
