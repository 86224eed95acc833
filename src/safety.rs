//! Per-step bound on how far a joint may be asked to move.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ArmError;

/// Largest allowed `|requested - current|` per command, in user units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxRelativeTarget {
    /// Same bound for every joint.
    Uniform(f64),
    /// Bound per joint name; joints not listed are left alone.
    PerJoint(BTreeMap<String, f64>),
}

impl MaxRelativeTarget {
    pub fn limit_for(&self, joint: &str) -> Option<f64> {
        match self {
            MaxRelativeTarget::Uniform(max) => Some(*max),
            MaxRelativeTarget::PerJoint(table) => table.get(joint).copied(),
        }
    }

    pub fn validate(&self) -> Result<(), ArmError> {
        let bad = |joint: &str, max: f64| {
            ArmError::InvalidConfiguration(format!(
                "max_relative_target for '{joint}' must be a finite value >= 0, got {max}"
            ))
        };
        match self {
            MaxRelativeTarget::Uniform(max) if !(max.is_finite() && *max >= 0.0) => {
                Err(bad("*", *max))
            }
            MaxRelativeTarget::PerJoint(table) => {
                match table.iter().find(|(_, m)| !(m.is_finite() && **m >= 0.0)) {
                    Some((joint, max)) => Err(bad(joint.as_str(), *max)),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

/// `current + clamp(requested - current, -max, max)`; a request already
/// within bounds is returned bit for bit.
pub fn clamp_step(requested: f64, current: f64, max: f64) -> f64 {
    let delta = requested - current;
    if delta.abs() <= max {
        requested
    } else {
        current + delta.clamp(-max, max)
    }
}

/// Cap every goal against the matching present position.
///
/// `goal_present` maps joint name to `(requested, current)`, where the
/// current value must have been read for this very command.
pub fn ensure_safe_goal_position(
    goal_present: &BTreeMap<String, (f64, f64)>,
    max_relative_target: &MaxRelativeTarget,
) -> Result<BTreeMap<String, f64>, ArmError> {
    max_relative_target.validate()?;

    let mut safe = BTreeMap::new();
    for (joint, &(requested, current)) in goal_present {
        let goal = match max_relative_target.limit_for(joint) {
            Some(max) => {
                let clamped = clamp_step(requested, current, max);
                if clamped != requested {
                    warn!(
                        "Relative goal position magnitude had to be clamped to be safe. \
                         {joint}: requested {requested}, current {current}, sent {clamped}"
                    );
                }
                clamped
            }
            None => requested,
        };
        safe.insert(joint.clone(), goal);
    }
    Ok(safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goals(pairs: &[(&str, f64, f64)]) -> BTreeMap<String, (f64, f64)> {
        pairs
            .iter()
            .map(|(j, r, c)| (j.to_string(), (*r, *c)))
            .collect()
    }

    #[test]
    fn clamps_towards_the_request() {
        let out = ensure_safe_goal_position(
            &goals(&[("base", 50.0, 10.0), ("link1", -40.0, 0.0)]),
            &MaxRelativeTarget::Uniform(5.0),
        )
        .unwrap();
        assert_eq!(out["base"], 15.0);
        assert_eq!(out["link1"], -5.0);
    }

    #[test]
    fn within_bound_is_untouched() {
        let out = ensure_safe_goal_position(
            &goals(&[("base", 12.5, 10.0)]),
            &MaxRelativeTarget::Uniform(5.0),
        )
        .unwrap();
        assert_eq!(out["base"], 12.5);
    }

    #[test]
    fn bound_holds_over_a_grid() {
        for c in [-100.0, -3.0, 0.0, 7.5, 90.0] {
            for r in [-120.0, -1.0, 0.0, 4.0, 200.0] {
                for m in [0.0, 0.5, 5.0, 1000.0] {
                    let g = clamp_step(r, c, m);
                    assert!((g - c).abs() <= m + 1e-12);
                    if (r - c).abs() <= m {
                        assert_eq!(g, r);
                    }
                }
            }
        }
    }

    #[test]
    fn unlisted_joints_pass_through() {
        let table = MaxRelativeTarget::PerJoint(BTreeMap::from([("base".to_string(), 1.0)]));
        let out =
            ensure_safe_goal_position(&goals(&[("base", 9.0, 0.0), ("gripper", 90.0, 0.0)]), &table)
                .unwrap();
        assert_eq!(out["base"], 1.0);
        assert_eq!(out["gripper"], 90.0);
    }

    #[test]
    fn malformed_bounds_are_rejected() {
        assert!(MaxRelativeTarget::Uniform(-1.0).validate().is_err());
        assert!(MaxRelativeTarget::Uniform(f64::NAN).validate().is_err());
        let table = MaxRelativeTarget::PerJoint(BTreeMap::from([("base".to_string(), -0.1)]));
        assert!(ensure_safe_goal_position(&goals(&[("base", 1.0, 0.0)]), &table).is_err());
    }

    #[test]
    fn deserializes_scalar_or_table() {
        let scalar: MaxRelativeTarget = serde_json::from_str("5.0").unwrap();
        assert_eq!(scalar, MaxRelativeTarget::Uniform(5.0));

        let table: MaxRelativeTarget = serde_json::from_str(r#"{"base": 2.0}"#).unwrap();
        assert_eq!(table.limit_for("base"), Some(2.0));
        assert_eq!(table.limit_for("link1"), None);
    }
}
