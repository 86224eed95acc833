use std::path::PathBuf;
use thiserror::Error;

use crate::bus::Register;

/// Failures reported by a motor bus transport. Never retried here.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus on {port} is not connected")]
    NotConnected { port: String },
    #[error("motor {id} did not answer (disconnected?)")]
    Disconnected { id: u8 },
    #[error("timed out talking to motor {id}")]
    Timeout { id: u8 },
    #[error("malformed reply from motor {id}: {detail}")]
    Malformed { id: u8, detail: String },
    #[error("no motor named '{0}' on this bus")]
    UnknownMotor(String),
    #[error("no motor with id {0} on this bus")]
    UnknownMotorId(u8),
    #[error("register {0} is not supported by this transport")]
    UnsupportedRegister(Register),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serial port error: {0}")]
    Io(#[from] serialport::Error),
}

/// Controller-level errors, carrying enough context to diagnose without
/// looking at the transport.
#[derive(Debug, Error)]
pub enum ArmError {
    #[error("{0} is already connected")]
    AlreadyConnected(String),
    #[error("{0} is not connected")]
    NotConnected(String),
    #[error("{device}: {source}")]
    Transport {
        device: String,
        #[source]
        source: BusError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("{device} has no joint '{joint}'")]
    UnknownJoint { device: String, joint: String },
    #[error("{device} does not accept feedback (got keys {keys:?})")]
    UnsupportedFeedback { device: String, keys: Vec<String> },
    #[error("calibration file {path}: {source}")]
    CalibrationStorage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("calibration file is not valid JSON: {0}")]
    CalibrationFormat(#[from] serde_json::Error),
    #[error("operator prompt failed: {0}")]
    Operator(#[from] std::io::Error),
}

impl ArmError {
    pub(crate) fn transport(device: &str) -> impl FnOnce(BusError) -> ArmError + '_ {
        move |source| ArmError::Transport {
            device: device.to_string(),
            source,
        }
    }
}

pub type ArmResult<T> = Result<T, ArmError>;
