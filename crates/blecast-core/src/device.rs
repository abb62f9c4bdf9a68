//! Logical device handles.
//!
//! A [`Device`] is the stable identity the event layer hands out for a
//! native peripheral handle. It stores only the handle; the name and the
//! connection state are read from the platform every time they are asked
//! for.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use blecast_types::ConnectionState;

use crate::platform::Central;

/// Shared reference to a logical device.
///
/// Two `SharedDevice`s refer to the same logical device when
/// [`Arc::ptr_eq`] holds, or equivalently when their [`Device::id`]s match.
pub type SharedDevice<C> = Arc<Device<C>>;

/// Stable identity for one physical peripheral within a registry session.
pub struct Device<C: Central> {
    id: Uuid,
    peripheral: C::Peripheral,
    central: Arc<C>,
}

impl<C: Central> Device<C> {
    pub(crate) fn new(peripheral: C::Peripheral, central: Arc<C>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peripheral,
            central,
        }
    }

    /// Identifier of this logical device instance.
    ///
    /// A new instance (and so a new id) is created for a peripheral after the
    /// registry is cleared.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The native handle this device wraps.
    pub fn peripheral(&self) -> &C::Peripheral {
        &self.peripheral
    }

    /// Display name as currently known by the platform.
    pub fn name(&self) -> Option<String> {
        self.central.peripheral_name(&self.peripheral)
    }

    /// Connection state, queried from the platform.
    pub fn connection_state(&self) -> ConnectionState {
        self.central.connection_state(&self.peripheral)
    }

    /// Whether the platform reports this device as connected.
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }
}

impl<C: Central> fmt::Debug for Device<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("peripheral", &self.peripheral)
            .field("name", &self.name())
            .finish()
    }
}

impl<C: Central> fmt::Display for Device<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({:?})", name, self.peripheral),
            None => write!(f, "{:?}", self.peripheral),
        }
    }
}
