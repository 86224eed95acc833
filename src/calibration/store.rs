use log::info;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{ArmError, ArmResult};
use crate::motor::CalibrationSet;

/// Durable calibration of one controller identity:
/// `<dir>/<robot kind>/<id>.json`.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(dir: &Path, kind: &str, id: &str) -> Self {
        Self {
            path: dir.join(kind).join(format!("{id}.json")),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, source: std::io::Error) -> ArmError {
        ArmError::CalibrationStorage {
            path: self.path.clone(),
            source,
        }
    }

    /// `None` when nothing has been saved yet.
    pub fn load(&self) -> ArmResult<Option<CalibrationSet>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.storage_error(e)),
        };
        let set: CalibrationSet = serde_json::from_str(&contents)?;
        Ok(Some(set))
    }

    /// Replace the stored set. The new file is written next to the old one
    /// and renamed over it, so a failed save leaves the old file as it was.
    pub fn save(&self, set: &CalibrationSet) -> ArmResult<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| self.storage_error(e))?;

        let json = serde_json::to_string_pretty(set)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.storage_error(e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.storage_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.storage_error(e.error))?;

        info!("Calibration saved to {}", self.path.display());
        Ok(())
    }
}
