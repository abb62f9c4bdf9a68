//! Connection event bridge.
//!
//! Emits the logical [`Device`](crate::Device) whenever the platform
//! reports a connect or a disconnect for it. The event carries no state;
//! subscribers ask the device for its current connection state.

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::device::SharedDevice;
use crate::platform::{Central, EventKind, PlatformEvent};
use crate::registry::DeviceRegistry;
use crate::stream::EventStream;

/// Bridge from platform connection notifications to device streams.
pub struct ConnectionBridge<C: Central> {
    central: Arc<C>,
    registry: Arc<DeviceRegistry<C>>,
}

impl<C: Central> ConnectionBridge<C> {
    pub fn new(central: Arc<C>, registry: Arc<DeviceRegistry<C>>) -> Self {
        Self { central, registry }
    }

    /// Subscribe to connect and disconnect events.
    pub fn device_status_changes(&self) -> EventStream<SharedDevice<C>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let hub = self.central.notifications();

        let connected = {
            let registry: Weak<DeviceRegistry<C>> = Arc::downgrade(&self.registry);
            let sender = sender.clone();
            hub.register(EventKind::Connected, move |event| {
                let PlatformEvent::Connected { peripheral } = event else {
                    return;
                };
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                trace!(peripheral = ?peripheral, "Peripheral connected");
                let _ = sender.send(registry.resolve(peripheral));
            })
        };

        let disconnected = {
            let registry: Weak<DeviceRegistry<C>> = Arc::downgrade(&self.registry);
            hub.register(EventKind::Disconnected, move |event| {
                let PlatformEvent::Disconnected { peripheral, error } = event else {
                    return;
                };
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                match error {
                    Some(error) => debug!(peripheral = ?peripheral, %error, "Peripheral disconnected with error"),
                    None => trace!(peripheral = ?peripheral, "Peripheral disconnected"),
                }
                let _ = sender.send(registry.resolve(peripheral));
            })
        };

        EventStream::new(receiver, vec![connected, disconnected])
    }
}

impl<C: Central> fmt::Debug for ConnectionBridge<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBridge").finish_non_exhaustive()
    }
}
