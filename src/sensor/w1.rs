//! DS18B20 probe on the Linux 1-Wire bus.
//!
//! The `w1_therm` kernel driver exposes each sensor as
//! `/sys/bus/w1/devices/<id>/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line carries the CRC verdict, the second the temperature in
//! millidegrees Celsius.

use super::{ProbeError, TemperatureProbe};
use std::fs;
use std::path::{Path, PathBuf};

/// Default mount point of the 1-Wire bus devices.
pub const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

pub struct W1Therm {
    id: String,
    path: PathBuf,
}

impl W1Therm {
    /// Open the sensor `id` (e.g. `28-0316a2791bff`) on the default bus.
    pub fn new(id: impl Into<String>) -> Result<Self, ProbeError> {
        Self::in_dir(Path::new(W1_DEVICES_DIR), id)
    }

    /// Open the sensor `id` below a custom devices directory.
    pub fn in_dir(devices_dir: &Path, id: impl Into<String>) -> Result<Self, ProbeError> {
        let id = id.into();
        let path = devices_dir.join(&id).join("w1_slave");
        if !path.exists() {
            return Err(ProbeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no 1-Wire sensor at {}", path.display()),
            )));
        }
        Ok(Self { id, path })
    }
}

impl TemperatureProbe for W1Therm {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_celsius(&mut self) -> Result<f64, ProbeError> {
        let content = fs::read_to_string(&self.path)?;
        parse_w1_slave(&content)
    }
}

/// Parse the contents of a `w1_slave` file into degrees Celsius.
pub fn parse_w1_slave(content: &str) -> Result<f64, ProbeError> {
    let mut lines = content.lines();
    let crc_line = lines.next().unwrap_or_default();
    if !crc_line.trim_end().ends_with("YES") {
        return Err(ProbeError::Transient(format!(
            "crc check failed: {:?}",
            crc_line.trim()
        )));
    }

    let data_line = lines
        .next()
        .ok_or_else(|| ProbeError::Malformed("missing data line".into()))?;
    let raw = data_line
        .split("t=")
        .nth(1)
        .ok_or_else(|| ProbeError::Malformed(format!("no t= field in {:?}", data_line.trim())))?;
    let millidegrees: i64 = raw
        .trim()
        .parse()
        .map_err(|e| ProbeError::Malformed(format!("bad t= value {:?}: {}", raw.trim(), e)))?;

    Ok(millidegrees as f64 / 1000.0)
}
