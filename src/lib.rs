pub mod actuator;
pub mod bus;
pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod motor;
pub mod orientation;
pub mod robot;
pub mod safety;

pub use error::{ArmError, ArmResult, BusError};
pub use robot::{Action, Device, Observation, Robot, Teleoperator};
