//! Process stop requests.
//!
//! Both daemons stop on SIGINT (Ctrl+C) and on SIGTERM (`kill`, systemd).
//! The handlers are installed up front so a signal arriving during startup is
//! not lost and never falls through to the default action, which would exit
//! without releasing the output.

use std::io;
use tokio::signal::unix::{Signal, SignalKind, signal};

pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    /// Install the SIGINT and SIGTERM handlers. Must be called inside a tokio runtime.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next stop request and return the signal name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}
