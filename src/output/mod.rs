//! Binary outputs (heater relay, generic switch).
//!
//! Callers only ever deal in logical on/off. The [`Polarity`] of the wiring
//! decides which electrical level that becomes, so an active-low relay board
//! needs no special handling anywhere else.

pub mod sysfs;

pub use sysfs::SysfsGpio;

use crate::error::{Result, ThermostatError};
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};

/// Electrical level that switches the load on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    /// Polarity from an "output active" setting (`true` = high turns the load on).
    pub fn from_active_level(active_high: bool) -> Self {
        if active_high {
            Polarity::ActiveHigh
        } else {
            Polarity::ActiveLow
        }
    }

    /// Physical level for a logical state.
    pub fn level(self, on: bool) -> bool {
        on ^ (self == Polarity::ActiveLow)
    }
}

/// Logical output state together with the wiring polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputState {
    on: bool,
    polarity: Polarity,
}

impl OutputState {
    pub fn off(polarity: Polarity) -> Self {
        Self {
            on: false,
            polarity,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Level to drive onto the wire for the current logical state.
    pub fn physical_level(&self) -> bool {
        self.polarity.level(self.on)
    }
}

/// A physical binary output line.
pub trait OutputPin: Send {
    /// Name used in logs and errors (e.g. `gpio17`).
    fn name(&self) -> &str;

    /// Drive the line to `level` (`true` = high).
    fn write(&mut self, level: bool) -> std::io::Result<()>;

    /// Give the line back to the system.
    fn release(&mut self) -> std::io::Result<()>;
}

/// Receives the new logical state after every physical transition.
pub trait OutputObserver: Send + Sync {
    fn on_state_change(&self, on: bool);
}

impl<F> OutputObserver for F
where
    F: Fn(bool) + Send + Sync,
{
    fn on_state_change(&self, on: bool) {
        self(on)
    }
}

struct Inner<P> {
    pin: Option<P>,
    state: OutputState,
}

/// Owns one output line and exposes its logical state.
///
/// Writes are idempotent: setting the current state again touches neither
/// the hardware nor the observer. A transition writes the line first and
/// notifies afterwards, both under the same lock, so observers see exactly
/// one notification per transition and never ahead of the physical change.
pub struct OutputController<P: OutputPin> {
    name: String,
    inner: Mutex<Inner<P>>,
    observer: RwLock<Option<Box<dyn OutputObserver>>>,
}

impl<P: OutputPin> OutputController<P> {
    /// Take ownership of `pin` and drive it to the logical-off level.
    pub fn new(mut pin: P, polarity: Polarity) -> Result<Self> {
        let name = pin.name().to_string();
        let state = OutputState::off(polarity);
        pin.write(state.physical_level())
            .map_err(|source| ThermostatError::Output {
                pin: name.clone(),
                source,
            })?;
        debug!("[Output] {} initialised off ({:?})", name, polarity);
        Ok(Self {
            name,
            inner: Mutex::new(Inner {
                pin: Some(pin),
                state,
            }),
            observer: RwLock::new(None),
        })
    }

    /// Register the observer notified on every transition.
    pub fn set_observer(&self, observer: impl OutputObserver + 'static) {
        *self.observer.write() = Some(Box::new(observer));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current logical state.
    pub fn current_state(&self) -> bool {
        self.inner.lock().state.is_on()
    }

    pub fn polarity(&self) -> Polarity {
        self.inner.lock().state.polarity()
    }

    /// Set the logical state. Returns whether a transition happened.
    ///
    /// A failed write leaves the stored state untouched and is returned to
    /// the caller; there is no degraded mode for a heater output.
    pub fn set_state(&self, on: bool) -> Result<bool> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state.is_on() == on {
            debug!("[Output] {} already {}", self.name, on_off(on));
            return Ok(false);
        }

        let pin = inner.pin.as_mut().ok_or_else(|| ThermostatError::Output {
            pin: self.name.clone(),
            source: std::io::Error::other("output already released"),
        })?;
        let next = OutputState {
            on,
            polarity: inner.state.polarity(),
        };
        pin.write(next.physical_level())
            .map_err(|source| ThermostatError::Output {
                pin: self.name.clone(),
                source,
            })?;
        inner.state = next;
        debug!(
            "[Output] {} -> {} (level {})",
            self.name,
            on_off(on),
            u8::from(next.physical_level())
        );

        if let Some(observer) = self.observer.read().as_ref() {
            observer.on_state_change(on);
        }
        Ok(true)
    }

    /// Drive the output off and release the line.
    ///
    /// Only the first call touches the hardware; later calls are no-ops.
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let Some(mut pin) = guard.pin.take() else {
            return Ok(());
        };
        let off = OutputState::off(guard.state.polarity());
        let written = pin.write(off.physical_level());
        if written.is_ok() {
            guard.state = off;
        }
        let released = pin.release();
        info!("[Output] {} released", self.name);

        written
            .and(released)
            .map_err(|source| ThermostatError::Output {
                pin: self.name.clone(),
                source,
            })
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().pin.is_none()
    }
}

impl<P: OutputPin> Drop for OutputController<P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("[Output] {} failed to release on drop: {}", self.name, e);
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Shared log of what happened to a [`RecordingPin`].
    #[derive(Default)]
    pub(crate) struct PinLog {
        pub writes: Vec<bool>,
        pub releases: usize,
        pub fail_writes: bool,
    }

    /// Pin that records every write in a log the test keeps a handle to.
    pub(crate) struct RecordingPin {
        pub log: Arc<Mutex<PinLog>>,
    }

    impl RecordingPin {
        pub fn new() -> (Self, Arc<Mutex<PinLog>>) {
            let log = Arc::new(Mutex::new(PinLog::default()));
            (Self { log: log.clone() }, log)
        }
    }

    impl OutputPin for RecordingPin {
        fn name(&self) -> &str {
            "gpio-test"
        }

        fn write(&mut self, level: bool) -> std::io::Result<()> {
            let mut log = self.log.lock();
            if log.fail_writes {
                return Err(std::io::Error::other("write refused"));
            }
            log.writes.push(level);
            Ok(())
        }

        fn release(&mut self) -> std::io::Result<()> {
            self.log.lock().releases += 1;
            Ok(())
        }
    }

    #[test]
    fn test_polarity_levels() {
        assert!(Polarity::ActiveHigh.level(true));
        assert!(!Polarity::ActiveHigh.level(false));
        assert!(!Polarity::ActiveLow.level(true));
        assert!(Polarity::ActiveLow.level(false));
        assert_eq!(Polarity::from_active_level(false), Polarity::ActiveLow);
    }

    #[test]
    fn test_construction_forces_logical_off() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveLow).unwrap();
        assert!(!output.current_state());
        assert_eq!(log.lock().writes, vec![true]);

        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveHigh).unwrap();
        assert!(!output.current_state());
        assert_eq!(log.lock().writes, vec![false]);
    }

    #[test]
    fn test_active_low_on_writes_low() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveLow).unwrap();
        assert!(output.set_state(true).unwrap());
        assert!(output.current_state());
        assert_eq!(log.lock().writes.last(), Some(&false));
    }

    #[test]
    fn test_active_high_on_writes_high() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveHigh).unwrap();
        assert!(output.set_state(true).unwrap());
        assert!(output.current_state());
        assert_eq!(log.lock().writes.last(), Some(&true));
    }

    #[test]
    fn test_writes_only_on_transitions() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveHigh).unwrap();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let seen = notified.clone();
        output.set_observer(move |on: bool| seen.lock().push(on));

        let sequence = [false, true, true, true, false, false, true];
        let mut expected_writes = vec![false];
        let mut previous = false;
        for on in sequence {
            let changed = output.set_state(on).unwrap();
            assert_eq!(changed, on != previous);
            if on != previous {
                expected_writes.push(on);
            }
            previous = on;
        }

        assert_eq!(log.lock().writes, expected_writes);
        assert_eq!(*notified.lock(), vec![true, false, true]);
    }

    #[test]
    fn test_notification_follows_physical_write() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveLow).unwrap();
        let writes_at_notify = Arc::new(AtomicUsize::new(0));
        let probe = writes_at_notify.clone();
        let log_for_observer = log.clone();
        output.set_observer(move |_on: bool| {
            probe.store(log_for_observer.lock().writes.len(), Ordering::SeqCst);
        });

        output.set_state(true).unwrap();
        assert_eq!(writes_at_notify.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_write_keeps_state_and_skips_notification() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveHigh).unwrap();
        let notified = Arc::new(AtomicUsize::new(0));
        let count = notified.clone();
        output.set_observer(move |_on: bool| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        log.lock().fail_writes = true;
        assert!(matches!(
            output.set_state(true),
            Err(ThermostatError::Output { .. })
        ));
        assert!(!output.current_state());
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_releases_exactly_once() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveLow).unwrap();
        output.set_state(true).unwrap();

        output.shutdown().unwrap();
        output.shutdown().unwrap();
        assert!(output.is_released());
        assert!(!output.current_state());
        drop(output);

        let log = log.lock();
        assert_eq!(log.releases, 1);
        assert_eq!(log.writes, vec![true, false, true]);
    }

    #[test]
    fn test_drop_releases_hardware() {
        let (pin, log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveHigh).unwrap();
        drop(output);
        assert_eq!(log.lock().releases, 1);
    }

    #[test]
    fn test_set_state_after_shutdown_fails() {
        let (pin, _log) = RecordingPin::new();
        let output = OutputController::new(pin, Polarity::ActiveHigh).unwrap();
        output.shutdown().unwrap();
        assert!(output.set_state(true).is_err());
    }

    #[test]
    fn test_concurrent_callers_notify_once_per_transition() {
        let (pin, log) = RecordingPin::new();
        let output = Arc::new(OutputController::new(pin, Polarity::ActiveHigh).unwrap());
        let notified = Arc::new(AtomicUsize::new(0));
        let count = notified.clone();
        output.set_observer(move |_on: bool| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let output = output.clone();
                std::thread::spawn(move || output.set_state(true).unwrap())
            })
            .collect();
        let transitions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();

        assert_eq!(transitions, 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().writes, vec![false, true]);
    }
}
