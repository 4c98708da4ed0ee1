//! Single instance lock using Unix socket.
//!
//! Two daemons driving the same relay would fight over the output, so each
//! controller name may only run once per host. The lock is a Unix socket,
//! which the OS cleans up when the process dies, avoiding stale lock files.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another instance with the same name is already running.
    #[error("another instance of {0:?} is already running")]
    AlreadyRunning(String),

    /// I/O error during lock acquisition.
    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Single instance lock using a Unix socket.
///
/// The lock is held as long as this struct exists. When dropped, the socket
/// file is removed.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Attempt to acquire the lock for the controller called `name`.
    pub fn acquire(name: &str) -> Result<Self, InstanceLockError> {
        let path = Self::socket_path(&runtime_dir(), name);

        // A socket nobody answers on was left behind by a SIGKILL'd process
        if path.exists() {
            match UnixStream::connect(&path) {
                Ok(_) => return Err(InstanceLockError::AlreadyRunning(name.to_string())),
                Err(_) => {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(InstanceLockError::AlreadyRunning(name.to_string()))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    /// Path of the lock socket for `name` inside `dir`.
    pub fn socket_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("mqtt-thermostat-{}.sock", crate::config::slug(name)))
    }
}

/// XDG_RUNTIME_DIR if available (auto-cleaned on logout), else /tmp.
fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
