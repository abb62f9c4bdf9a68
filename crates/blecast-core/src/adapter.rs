//! Public adapter facade.
//!
//! [`Adapter`] is the single entry point of the crate. It owns the device
//! registry and wires the scan manager and the two bridges to one
//! [`Central`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use blecast_core::{Adapter, AdapterConfig, MockCentral};
//! use blecast_types::AdapterStatus;
//!
//! let central = Arc::new(MockCentral::new());
//! let adapter = Adapter::with_config(central, AdapterConfig::default().allow_duplicates(false));
//!
//! let mut status = adapter.status_changes();
//! assert_eq!(status.try_recv(), Some(AdapterStatus::PoweredOn));
//!
//! let mut scanning = adapter.scanning_status_changes();
//! let scan = adapter.scan();
//! assert!(adapter.is_scanning());
//! drop(scan);
//! assert_eq!(scanning.drain(), vec![true, false]);
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use blecast_types::AdapterStatus;

use crate::config::AdapterConfig;
use crate::connection::ConnectionBridge;
use crate::device::SharedDevice;
use crate::platform::Central;
use crate::registry::DeviceRegistry;
use crate::scan::{PlatformScan, ScanResult, ScanStreamManager};
use crate::state::StateBridge;
use crate::stream::EventStream;

/// A BLE adapter in the central role.
pub struct Adapter<C: Central> {
    central: Arc<C>,
    config: AdapterConfig,
    registry: Arc<DeviceRegistry<C>>,
    scans: ScanStreamManager<C>,
    state: StateBridge<C>,
    connections: ConnectionBridge<C>,
}

impl<C: Central> Adapter<C> {
    /// Create an adapter with the default configuration.
    pub fn new(central: Arc<C>) -> Self {
        Self::with_config(central, AdapterConfig::default())
    }

    /// Create an adapter with a custom configuration.
    pub fn with_config(central: Arc<C>, config: AdapterConfig) -> Self {
        debug!(?config, "Creating adapter");
        let registry = Arc::new(DeviceRegistry::new(Arc::clone(&central)));
        Self {
            scans: ScanStreamManager::new(Arc::clone(&central), Arc::clone(&registry), &config),
            state: StateBridge::new(Arc::clone(&central)),
            connections: ConnectionBridge::new(Arc::clone(&central), Arc::clone(&registry)),
            registry,
            config,
            central,
        }
    }

    /// Whether the platform is currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.central.is_scanning()
    }

    /// Current adapter status.
    pub fn status(&self) -> AdapterStatus {
        self.state.status()
    }

    /// Subscribe to every advertisement.
    ///
    /// All subscribers share one platform scan. The scan starts with the
    /// first subscriber and stops when the last stream is dropped.
    pub fn scan(&self) -> EventStream<ScanResult<C>> {
        self.scans.scan()
    }

    /// Subscribe to advertisements that list `service`.
    pub fn background_scan(&self, service: Uuid) -> EventStream<ScanResult<C>> {
        self.scans.background_scan(service)
    }

    /// Subscribe to adapter status, starting with the current value.
    pub fn status_changes(&self) -> EventStream<AdapterStatus> {
        self.state.status_changes()
    }

    /// Subscribe to connect and disconnect events.
    pub fn device_status_changes(&self) -> EventStream<SharedDevice<C>> {
        self.connections.device_status_changes()
    }

    /// Subscribe to scan session transitions.
    pub fn scanning_status_changes(&self) -> EventStream<bool> {
        self.scans.scanning_status_changes()
    }

    /// The scan the platform was last asked to run.
    pub fn platform_scan(&self) -> PlatformScan {
        self.scans.platform_scan()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry<C>> {
        &self.registry
    }

    pub fn central(&self) -> &Arc<C> {
        &self.central
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

impl<C: Central> fmt::Debug for Adapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("status", &self.status())
            .field("scans", &self.scans)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCentral;
    use blecast_types::{AdvertisementData, PlatformState};

    #[test]
    fn test_is_scanning_reads_through() {
        let central = Arc::new(MockCentral::new());
        let adapter = Adapter::new(Arc::clone(&central));
        assert!(!adapter.is_scanning());

        let _scan = adapter.scan();
        assert!(adapter.is_scanning());
    }

    #[test]
    fn test_status_reads_through() {
        let central = Arc::new(MockCentral::new().with_state(PlatformState::Unauthorized));
        let adapter = Adapter::new(central);
        assert_eq!(adapter.status(), AdapterStatus::Unauthorized);
    }

    #[test]
    fn test_scan_uses_configured_duplicate_policy() {
        let central = Arc::new(MockCentral::new());
        let adapter = Adapter::with_config(
            Arc::clone(&central),
            AdapterConfig::default().allow_duplicates(false),
        );

        let _scan = adapter.scan();
        let request = central.last_scan_request().unwrap();
        assert_eq!(request.filter, None);
        assert!(!request.allow_duplicates);
    }

    #[test]
    fn test_scan_and_connection_share_registry() {
        let central = Arc::new(MockCentral::new());
        let adapter = Adapter::new(Arc::clone(&central));

        let mut scan = adapter.scan();
        let mut connections = adapter.device_status_changes();

        central.discover("H1", Some(-60), AdvertisementData::new());
        central.connect("H1");

        let seen = scan.try_recv().unwrap();
        let connected = connections.try_recv().unwrap();
        assert!(Arc::ptr_eq(seen.device(), &connected));
        assert_eq!(adapter.registry().len(), 1);
    }
}
