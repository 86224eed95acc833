//! Arm configuration, loaded from TOML.
//!
//! ```toml
//! id = "umbra_follower_1"
//! port = "/dev/ttyUSB0"
//! arm_side = "left"
//! max_relative_target = 5.0
//!
//! [orientation]
//! link4 = "keep"
//!
//! [tuning]
//! goal_velocity = 400
//! ```

use log::error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::actuator::linear::{
    GRIPPER_MAX_DIST, GRIPPER_MAX_TICKS, GRIPPER_MIN_DIST, GRIPPER_MIN_TICKS,
};
use crate::error::ArmError;
use crate::orientation::{ArmSide, Correction};
use crate::safety::MaxRelativeTarget;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    toml::from_str(&contents).map_err(|e| {
        error!("Failed to parse config TOML '{}': {}", path.display(), e);
        ConfigError::Toml(e)
    })
}

fn default_calibration_dir() -> PathBuf {
    std::env::var_os("UMBRA_CALIBRATION_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("calibration"))
}

/// Register values written at connect time. Tuned on the bench for the
/// current hardware revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorTuning {
    /// Written to `Goal_Velocity` with every motion command.
    pub goal_velocity: i32,
    /// Lower than the factory 32 to avoid shakiness.
    pub p_coefficient: i32,
    pub i_coefficient: i32,
    pub d_coefficient: i32,
    pub gripper_max_torque: i32,
    pub gripper_protection_current: i32,
    pub gripper_overload_torque: i32,
}

impl Default for MotorTuning {
    fn default() -> Self {
        Self {
            goal_velocity: 500,
            p_coefficient: 16,
            i_coefficient: 0,
            d_coefficient: 32,
            gripper_max_torque: 500,
            gripper_protection_current: 250,
            gripper_overload_torque: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GripperConfig {
    /// Unsigned percent of the calibrated range.
    #[default]
    Percent,
    /// Jaw opening in meters.
    Linear {
        min_dist: f64,
        max_dist: f64,
        min_ticks: i32,
        max_ticks: i32,
    },
}

impl GripperConfig {
    pub fn stock_linear() -> Self {
        GripperConfig::Linear {
            min_dist: GRIPPER_MIN_DIST,
            max_dist: GRIPPER_MAX_DIST,
            min_ticks: GRIPPER_MIN_TICKS,
            max_ticks: GRIPPER_MAX_TICKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    pub id: String,
    pub calibration_dir: PathBuf,
    pub port: String,
    /// "left" or "right".
    pub arm_side: String,
    pub disable_torque_on_disconnect: bool,
    /// `None` disables the clamp.
    pub max_relative_target: Option<MaxRelativeTarget>,
    pub use_degrees: bool,
    pub gripper: GripperConfig,
    /// Per-motor replacements for the side's orientation rules.
    pub orientation: BTreeMap<String, Correction>,
    pub tuning: MotorTuning,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            id: "umbra_follower".to_string(),
            calibration_dir: default_calibration_dir(),
            port: "/dev/ttyUSB0".to_string(),
            arm_side: "left".to_string(),
            disable_torque_on_disconnect: true,
            max_relative_target: None,
            use_degrees: false,
            gripper: GripperConfig::Percent,
            orientation: BTreeMap::new(),
            tuning: MotorTuning::default(),
        }
    }
}

impl FollowerConfig {
    pub fn validate(&self) -> Result<ArmSide, ArmError> {
        if self.port.is_empty() {
            return Err(ArmError::InvalidConfiguration(format!(
                "{}: port must not be empty",
                self.id
            )));
        }
        if let Some(max) = &self.max_relative_target {
            max.validate()?;
        }
        self.arm_side.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderConfig {
    pub id: String,
    pub calibration_dir: PathBuf,
    pub port: String,
    pub disable_torque_on_disconnect: bool,
    pub use_degrees: bool,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            id: "umbra_leader".to_string(),
            calibration_dir: default_calibration_dir(),
            port: "/dev/ttyACM0".to_string(),
            disable_torque_on_disconnect: true,
            use_degrees: false,
        }
    }
}

impl LeaderConfig {
    pub fn validate(&self) -> Result<(), ArmError> {
        if self.port.is_empty() {
            return Err(ArmError::InvalidConfiguration(format!(
                "{}: port must not be empty",
                self.id
            )));
        }
        Ok(())
    }
}

/// Settings applied independently to each arm of a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideConfig {
    pub port: String,
    pub disable_torque_on_disconnect: bool,
    /// Only meaningful for follower arms.
    pub max_relative_target: Option<MaxRelativeTarget>,
    pub use_degrees: bool,
}

impl Default for SideConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            disable_torque_on_disconnect: true,
            max_relative_target: None,
            use_degrees: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BimanualConfig {
    pub id: String,
    pub calibration_dir: PathBuf,
    pub left: SideConfig,
    pub right: SideConfig,
    pub tuning: MotorTuning,
}

impl Default for BimanualConfig {
    fn default() -> Self {
        Self {
            id: "bi_umbra".to_string(),
            calibration_dir: default_calibration_dir(),
            left: SideConfig::default(),
            right: SideConfig::default(),
            tuning: MotorTuning::default(),
        }
    }
}

impl BimanualConfig {
    fn side(&self, side: ArmSide) -> &SideConfig {
        match side {
            ArmSide::Left => &self.left,
            ArmSide::Right => &self.right,
        }
    }

    /// `<id>_left` / `<id>_right`.
    pub fn arm_id(&self, side: ArmSide) -> String {
        format!("{}_{}", self.id, side)
    }

    pub fn follower(&self, side: ArmSide) -> FollowerConfig {
        let arm = self.side(side);
        FollowerConfig {
            id: self.arm_id(side),
            calibration_dir: self.calibration_dir.clone(),
            port: arm.port.clone(),
            arm_side: side.to_string(),
            disable_torque_on_disconnect: arm.disable_torque_on_disconnect,
            max_relative_target: arm.max_relative_target.clone(),
            use_degrees: arm.use_degrees,
            tuning: self.tuning.clone(),
            ..FollowerConfig::default()
        }
    }

    pub fn leader(&self, side: ArmSide) -> LeaderConfig {
        let arm = self.side(side);
        LeaderConfig {
            id: self.arm_id(side),
            calibration_dir: self.calibration_dir.clone(),
            port: arm.port.clone(),
            disable_torque_on_disconnect: arm.disable_torque_on_disconnect,
            use_degrees: arm.use_degrees,
        }
    }
}
