//! Scriptable in-memory central for testing.
//!
//! [`MockCentral`] implements [`Central`] without any radio. Peripherals are
//! plain `String` handles. Tests drive it by injecting platform events and
//! then inspect the scan commands it received.
//!
//! # Features
//!
//! - **Event injection**: state changes, discoveries, connects and disconnects
//! - **Call accounting**: start/stop counters and the full scan request history
//! - **Failure injection**: make scan commands return an error
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use blecast_core::{Adapter, MockCentral};
//! use blecast_types::AdvertisementData;
//!
//! let central = Arc::new(MockCentral::new());
//! let adapter = Adapter::new(Arc::clone(&central));
//!
//! let mut scan = adapter.scan();
//! central.discover("H1", Some(-60), AdvertisementData::new());
//!
//! let result = scan.try_recv().unwrap();
//! assert_eq!(result.rssi(), -60);
//! assert_eq!(central.start_scan_count(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use uuid::Uuid;

use blecast_types::{AdvertisementData, ConnectionState, PlatformState};

use crate::error::{Error, Result};
use crate::platform::{Central, NotificationHub, PlatformEvent};

/// A recorded `start_scan` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub filter: Option<Uuid>,
    pub allow_duplicates: bool,
}

#[derive(Default)]
struct Peripherals {
    names: HashMap<String, String>,
    connections: HashMap<String, ConnectionState>,
}

/// A mock platform central.
pub struct MockCentral {
    state: RwLock<PlatformState>,
    scanning: AtomicBool,
    start_scan_calls: AtomicU32,
    stop_scan_calls: AtomicU32,
    scan_requests: RwLock<Vec<ScanRequest>>,
    peripherals: RwLock<Peripherals>,
    fail_scan_commands: AtomicBool,
    hub: NotificationHub<String>,
}

impl fmt::Debug for MockCentral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCentral")
            .field("state", &self.state())
            .field("scanning", &self.is_scanning())
            .field("start_scan_calls", &self.start_scan_count())
            .field("stop_scan_calls", &self.stop_scan_count())
            .finish()
    }
}

impl Default for MockCentral {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCentral {
    /// Create a powered-on central with no peripherals.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PlatformState::PoweredOn),
            scanning: AtomicBool::new(false),
            start_scan_calls: AtomicU32::new(0),
            stop_scan_calls: AtomicU32::new(0),
            scan_requests: RwLock::new(Vec::new()),
            peripherals: RwLock::new(Peripherals::default()),
            fail_scan_commands: AtomicBool::new(false),
            hub: NotificationHub::new(),
        }
    }

    /// Start in `state` instead of powered on.
    #[must_use]
    pub fn with_state(self, state: PlatformState) -> Self {
        *self.write_state() = state;
        self
    }

    /// Pre-populate a named peripheral.
    #[must_use]
    pub fn with_peripheral(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.set_name(id, name);
        self
    }

    /// A random peripheral handle in the `MOCK-XXXXXX` format.
    pub fn random_peripheral() -> String {
        format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF)
    }

    /// Change the adapter state and notify handlers.
    pub fn set_state(&self, state: PlatformState) {
        *self.write_state() = state;
        debug!(?state, "Mock adapter state changed");
        self.notify_state_changed();
    }

    /// Fire a state-changed notification without changing the state.
    pub fn notify_state_changed(&self) -> usize {
        self.hub.dispatch(&PlatformEvent::StateChanged)
    }

    /// Deliver an advertisement from `id`.
    ///
    /// While a filtered scan is running, advertisements that do not carry
    /// the filter service are dropped, as a platform would.
    ///
    /// Returns the number of handlers that saw it.
    pub fn discover(
        &self,
        id: impl Into<String>,
        rssi: Option<i16>,
        advertisement: AdvertisementData,
    ) -> usize {
        if let Some(service) = self.active_filter()
            && !advertisement.advertises(&service)
        {
            return 0;
        }

        let id = id.into();
        if let Some(name) = advertisement.local_name.clone() {
            self.peripherals_mut().names.insert(id.clone(), name);
        }
        self.hub.dispatch(&PlatformEvent::Discovered {
            peripheral: id,
            rssi,
            advertisement,
        })
    }

    fn active_filter(&self) -> Option<Uuid> {
        if !self.is_scanning() {
            return None;
        }
        self.last_scan_request().and_then(|request| request.filter)
    }

    /// Mark `id` connected and notify handlers.
    pub fn connect(&self, id: impl Into<String>) -> usize {
        let id = id.into();
        self.set_connection_state(&id, ConnectionState::Connected);
        self.hub.dispatch(&PlatformEvent::Connected { peripheral: id })
    }

    /// Mark `id` disconnected and notify handlers.
    pub fn disconnect(&self, id: impl Into<String>, error: Option<&str>) -> usize {
        let id = id.into();
        self.set_connection_state(&id, ConnectionState::Disconnected);
        self.hub.dispatch(&PlatformEvent::Disconnected {
            peripheral: id,
            error: error.map(str::to_string),
        })
    }

    /// Set the name the platform reports for `id`.
    pub fn set_name(&self, id: impl Into<String>, name: impl Into<String>) {
        self.peripherals_mut().names.insert(id.into(), name.into());
    }

    /// Set the connection state without notifying anyone.
    pub fn set_connection_state(&self, id: &str, state: ConnectionState) {
        self.peripherals_mut()
            .connections
            .insert(id.to_string(), state);
    }

    /// Make subsequent scan commands fail (or succeed again).
    pub fn set_fail_scan_commands(&self, fail: bool) {
        self.fail_scan_commands.store(fail, Ordering::SeqCst);
    }

    /// Number of `start_scan` calls so far, including failed ones.
    pub fn start_scan_count(&self) -> u32 {
        self.start_scan_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop_scan` calls so far, including failed ones.
    pub fn stop_scan_count(&self) -> u32 {
        self.stop_scan_calls.load(Ordering::SeqCst)
    }

    /// Every `start_scan` call, oldest first.
    pub fn scan_requests(&self) -> Vec<ScanRequest> {
        self.scan_requests
            .read()
            .expect("mock scan request lock poisoned - a thread panicked while holding the lock")
            .clone()
    }

    /// The most recent `start_scan` call.
    pub fn last_scan_request(&self) -> Option<ScanRequest> {
        self.scan_requests().last().copied()
    }

    fn check_failure(&self, command: &str) -> Result<()> {
        if self.fail_scan_commands.load(Ordering::SeqCst) {
            return Err(Error::platform(format!("mock {command} failure")));
        }
        Ok(())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PlatformState> {
        self.state
            .write()
            .expect("mock state lock poisoned - a thread panicked while holding the lock")
    }

    fn peripherals(&self) -> RwLockReadGuard<'_, Peripherals> {
        self.peripherals
            .read()
            .expect("mock peripheral lock poisoned - a thread panicked while holding the lock")
    }

    fn peripherals_mut(&self) -> RwLockWriteGuard<'_, Peripherals> {
        self.peripherals
            .write()
            .expect("mock peripheral lock poisoned - a thread panicked while holding the lock")
    }
}

impl Central for MockCentral {
    type Peripheral = String;

    fn start_scan(&self, filter: Option<Uuid>, allow_duplicates: bool) -> Result<()> {
        self.start_scan_calls.fetch_add(1, Ordering::SeqCst);
        self.scan_requests
            .write()
            .expect("mock scan request lock poisoned - a thread panicked while holding the lock")
            .push(ScanRequest {
                filter,
                allow_duplicates,
            });
        self.check_failure("start_scan")?;
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        self.stop_scan_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure("stop_scan")?;
        self.scanning.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    fn state(&self) -> PlatformState {
        *self
            .state
            .read()
            .expect("mock state lock poisoned - a thread panicked while holding the lock")
    }

    fn peripheral_name(&self, peripheral: &String) -> Option<String> {
        self.peripherals().names.get(peripheral).cloned()
    }

    fn connection_state(&self, peripheral: &String) -> ConnectionState {
        self.peripherals()
            .connections
            .get(peripheral)
            .copied()
            .unwrap_or_default()
    }

    fn notifications(&self) -> &NotificationHub<String> {
        &self.hub
    }
}
