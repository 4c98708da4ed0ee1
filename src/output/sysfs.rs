//! GPIO output through the Linux sysfs interface (`/sys/class/gpio`).

use super::OutputPin;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default sysfs GPIO class directory.
pub const GPIO_CLASS_DIR: &str = "/sys/class/gpio";

/// udev needs a moment to fix permissions on a freshly exported line.
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

pub struct SysfsGpio {
    line: u32,
    name: String,
    base: PathBuf,
}

impl SysfsGpio {
    /// Export `line` as an output starting at `initial_level`.
    pub fn export(line: u32, initial_level: bool) -> io::Result<Self> {
        Self::export_in(Path::new(GPIO_CLASS_DIR), line, initial_level)
    }

    /// Export `line` below a custom GPIO class directory.
    ///
    /// The direction is set with `high`/`low` rather than `out`, which
    /// configures the line as an output and drives the level in one step,
    /// so it never glitches through the default level.
    pub fn export_in(class_dir: &Path, line: u32, initial_level: bool) -> io::Result<Self> {
        let name = format!("gpio{}", line);
        let line_dir = class_dir.join(&name);
        if !line_dir.exists() {
            fs::write(class_dir.join("export"), line.to_string())?;
            std::thread::sleep(EXPORT_SETTLE);
        }
        fs::write(
            line_dir.join("direction"),
            if initial_level { "high" } else { "low" },
        )?;
        debug!("[GPIO] exported {} as output", name);

        Ok(Self {
            line,
            name,
            base: class_dir.to_path_buf(),
        })
    }

    fn line_dir(&self) -> PathBuf {
        self.base.join(&self.name)
    }
}

impl OutputPin for SysfsGpio {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, level: bool) -> io::Result<()> {
        fs::write(self.line_dir().join("value"), if level { "1" } else { "0" })
    }

    fn release(&mut self) -> io::Result<()> {
        if let Err(e) = fs::write(self.line_dir().join("direction"), "in") {
            warn!("[GPIO] could not float {}: {}", self.name, e);
        }
        fs::write(self.base.join("unexport"), self.line.to_string())
    }
}
