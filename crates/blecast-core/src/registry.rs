//! Device identity registry.
//!
//! Maps native peripheral handles to [`Device`]s so that repeated discovery
//! and connection callbacks for the same peripheral produce the same logical
//! device. The registry is owned by one adapter; it is emptied when a new
//! scan session starts, which gives every session a fresh identity view.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::device::{Device, SharedDevice};
use crate::platform::Central;

/// Deduplicating cache from native handle to [`Device`].
pub struct DeviceRegistry<C: Central> {
    central: Arc<C>,
    devices: Mutex<HashMap<C::Peripheral, SharedDevice<C>>>,
}

impl<C: Central> DeviceRegistry<C> {
    /// Create an empty registry for `central`.
    pub fn new(central: Arc<C>) -> Self {
        Self {
            central,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Return the device for `peripheral`, creating it on first sight.
    ///
    /// The lookup and the insert happen under one lock, so concurrent
    /// callers for the same handle always get the same instance.
    pub fn resolve(&self, peripheral: &C::Peripheral) -> SharedDevice<C> {
        let mut devices = self.lock();
        let device = devices.entry(peripheral.clone()).or_insert_with(|| {
            let device = Arc::new(Device::new(peripheral.clone(), Arc::clone(&self.central)));
            debug!(peripheral = ?peripheral, id = %device.id(), "Registered new device");
            device
        });
        Arc::clone(device)
    }

    /// Look up a device without creating one.
    pub fn get(&self, peripheral: &C::Peripheral) -> Option<SharedDevice<C>> {
        self.lock().get(peripheral).cloned()
    }

    /// Forget every device.
    ///
    /// Devices already handed out stay valid; the next resolve of the same
    /// handle creates a new instance.
    pub fn clear(&self) {
        let mut devices = self.lock();
        debug!(count = devices.len(), "Clearing device registry");
        devices.clear();
    }

    /// Snapshot of all known devices.
    pub fn devices(&self) -> Vec<SharedDevice<C>> {
        self.lock().values().cloned().collect()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<C::Peripheral, SharedDevice<C>>> {
        self.devices
            .lock()
            .expect("device registry lock poisoned - a thread panicked while holding the lock")
    }
}

impl<C: Central> fmt::Debug for DeviceRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.len())
            .finish()
    }
}
