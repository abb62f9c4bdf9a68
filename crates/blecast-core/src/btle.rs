//! btleplug-backed platform central.
//!
//! [`BtleplugCentral`] adapts a `btleplug` adapter to the synchronous
//! [`Central`] interface. Two tokio tasks run for each central:
//!
//! - an event pump that turns `CentralEvent`s into [`PlatformEvent`]s and
//!   dispatches them one at a time, in arrival order;
//! - a scan worker that executes scan commands sequentially, so a stop can
//!   never overtake the start issued before it.
//!
//! Both tasks end when the central is dropped.
//!
//! btleplug has no duplicate filter of its own. Without duplicates only
//! `DeviceDiscovered` is forwarded; with duplicates `DeviceUpdated` is
//! forwarded as well.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use btleplug::api::{
    Central as _, CentralEvent, CentralState, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter,
};
use btleplug::platform::{Adapter as BtleAdapter, Manager, PeripheralId};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blecast_types::{AdvertisementData, ConnectionState, ManufacturerData, PlatformState};

use crate::config::BtleplugOptions;
use crate::error::{Error, Result};
use crate::platform::{Central, NotificationHub, PlatformEvent};

#[derive(Debug)]
enum ScanCommand {
    Start(ScanFilter),
    Stop,
}

/// A [`Central`] backed by the host Bluetooth stack through btleplug.
pub struct BtleplugCentral {
    adapter: BtleAdapter,
    description: String,
    hub: NotificationHub<PeripheralId>,
    state: RwLock<PlatformState>,
    scanning: AtomicBool,
    allow_duplicates: AtomicBool,
    names: RwLock<HashMap<PeripheralId, String>>,
    connections: RwLock<HashMap<PeripheralId, ConnectionState>>,
    commands: mpsc::UnboundedSender<ScanCommand>,
    cancel: CancellationToken,
}

impl fmt::Debug for BtleplugCentral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BtleplugCentral")
            .field("adapter", &self.description)
            .field("state", &self.state())
            .field("scanning", &self.is_scanning())
            .finish()
    }
}

impl BtleplugCentral {
    /// Open the first Bluetooth adapter.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new() -> Result<Arc<Self>> {
        Self::with_options(&BtleplugOptions::default()).await
    }

    /// Open the adapter selected by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`] if no adapter matches, or
    /// [`Error::Bluetooth`] if the host stack cannot be queried.
    pub async fn with_options(options: &BtleplugOptions) -> Result<Arc<Self>> {
        options.validate()?;
        let (adapter, description) = select_adapter(options).await?;
        info!(adapter = %description, "Opened Bluetooth adapter");

        let events = adapter.events().await?;
        let state = match adapter.adapter_state().await {
            Ok(state) => platform_state(state),
            Err(e) => {
                warn!("Could not read adapter state: {}", e);
                PlatformState::Unknown
            }
        };
        debug!(?state, "Initial adapter state");
        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let central = Arc::new(Self {
            adapter: adapter.clone(),
            description,
            hub: NotificationHub::new(),
            state: RwLock::new(state),
            scanning: AtomicBool::new(false),
            allow_duplicates: AtomicBool::new(true),
            names: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            commands,
            cancel: cancel.clone(),
        });

        tokio::spawn(run_scan_worker(adapter, command_rx, cancel.clone()));

        let weak = Arc::downgrade(&central);
        tokio::spawn(run_event_pump(weak, events, cancel));

        Ok(central)
    }

    /// Description of the underlying adapter, as reported by the host.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Record a new adapter state and notify handlers.
    ///
    /// The event pump calls this for every `StateUpdate` from btleplug.
    pub fn set_state(&self, state: PlatformState) {
        *self
            .state
            .write()
            .expect("central state lock poisoned - a thread panicked while holding the lock") = state;
        self.hub.dispatch(&PlatformEvent::StateChanged);
    }

    fn send(&self, command: ScanCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::platform("scan worker has stopped"))
    }

    async fn handle_event(&self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(id) => self.handle_advertisement(id).await,
            CentralEvent::DeviceUpdated(id) if self.allow_duplicates.load(Ordering::SeqCst) => {
                self.handle_advertisement(id).await
            }
            CentralEvent::DeviceConnected(id) => {
                self.set_connection_state(&id, ConnectionState::Connected);
                self.hub.dispatch(&PlatformEvent::Connected { peripheral: id });
            }
            CentralEvent::DeviceDisconnected(id) => {
                self.set_connection_state(&id, ConnectionState::Disconnected);
                self.hub.dispatch(&PlatformEvent::Disconnected {
                    peripheral: id,
                    error: None,
                });
            }
            CentralEvent::StateUpdate(state) => {
                let state = platform_state(state);
                info!(?state, "Adapter state changed");
                self.set_state(state);
            }
            _ => {}
        }
    }

    async fn handle_advertisement(&self, id: PeripheralId) {
        let peripheral = match self.adapter.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(e) => {
                debug!("Failed to look up peripheral {:?}: {}", id, e);
                return;
            }
        };
        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => return,
            Err(e) => {
                debug!("Failed to read properties for {:?}: {}", id, e);
                return;
            }
        };

        if let Some(name) = &properties.local_name {
            self.names
                .write()
                .expect("central name lock poisoned - a thread panicked while holding the lock")
                .insert(id.clone(), name.clone());
        }

        let rssi = properties.rssi;
        self.hub.dispatch(&PlatformEvent::Discovered {
            peripheral: id,
            rssi,
            advertisement: advertisement_from_properties(properties),
        });
    }

    fn set_connection_state(&self, id: &PeripheralId, state: ConnectionState) {
        self.connections
            .write()
            .expect("central connection lock poisoned - a thread panicked while holding the lock")
            .insert(id.clone(), state);
    }
}

impl Central for BtleplugCentral {
    type Peripheral = PeripheralId;

    fn start_scan(&self, filter: Option<Uuid>, allow_duplicates: bool) -> Result<()> {
        self.allow_duplicates.store(allow_duplicates, Ordering::SeqCst);
        self.send(ScanCommand::Start(ScanFilter {
            services: filter.into_iter().collect(),
        }))?;
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        self.send(ScanCommand::Stop)?;
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
            .expect("central state lock poisoned - a thread panicked while holding the lock")
    }

    fn peripheral_name(&self, peripheral: &PeripheralId) -> Option<String> {
        self.names
            .read()
            .expect("central name lock poisoned - a thread panicked while holding the lock")
            .get(peripheral)
            .cloned()
    }

    fn connection_state(&self, peripheral: &PeripheralId) -> ConnectionState {
        self.connections
            .read()
            .expect("central connection lock poisoned - a thread panicked while holding the lock")
            .get(peripheral)
            .copied()
            .unwrap_or_default()
    }

    fn notifications(&self) -> &NotificationHub<PeripheralId> {
        &self.hub
    }
}

impl Drop for BtleplugCentral {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn select_adapter(options: &BtleplugOptions) -> Result<(BtleAdapter, String)> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let count = adapters.len();

    if let Some(name) = &options.adapter_name {
        let needle = name.to_lowercase();
        for adapter in adapters {
            let description = adapter.adapter_info().await?;
            if description.to_lowercase().contains(&needle) {
                return Ok((adapter, description));
            }
        }
        return Err(Error::NoAdapter(format!(
            "none of {count} adapters matches '{name}'"
        )));
    }

    let adapter = adapters
        .into_iter()
        .nth(options.adapter_index)
        .ok_or_else(|| {
            Error::NoAdapter(format!(
                "adapter index {} out of range ({count} found)",
                options.adapter_index
            ))
        })?;
    let description = adapter.adapter_info().await?;
    Ok((adapter, description))
}

async fn run_scan_worker(
    adapter: BtleAdapter,
    mut commands: mpsc::UnboundedReceiver<ScanCommand>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Scan worker cancelled");
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                let result = match command {
                    ScanCommand::Start(filter) => adapter.start_scan(filter).await,
                    ScanCommand::Stop => adapter.stop_scan().await,
                };
                if let Err(e) = result {
                    warn!("btleplug scan command failed: {}", e);
                }
            }
        }
    }

    // Leave the radio idle once nobody can issue commands anymore.
    if let Err(e) = adapter.stop_scan().await {
        debug!("Final stop_scan failed: {}", e);
    }
}

async fn run_event_pump<S>(central: Weak<BtleplugCentral>, mut events: S, cancel: CancellationToken)
where
    S: futures::Stream<Item = CentralEvent> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Event pump cancelled");
                break;
            }
            event = events.next() => {
                let Some(event) = event else {
                    info!("Adapter event stream ended");
                    break;
                };
                let Some(central) = central.upgrade() else {
                    break;
                };
                central.handle_event(event).await;
            }
        }
    }
}

fn platform_state(state: CentralState) -> PlatformState {
    match state {
        CentralState::PoweredOn => PlatformState::PoweredOn,
        CentralState::PoweredOff => PlatformState::PoweredOff,
        _ => PlatformState::Unknown,
    }
}

/// Build [`AdvertisementData`] from btleplug's cached peripheral properties.
///
/// When several manufacturer records are present, the one with the lowest
/// company id is kept.
fn advertisement_from_properties(properties: PeripheralProperties) -> AdvertisementData {
    let manufacturer_data = properties
        .manufacturer_data
        .iter()
        .min_by_key(|(company_id, _)| **company_id)
        .map(|(company_id, data)| ManufacturerData::new(*company_id, data.clone()));

    AdvertisementData {
        local_name: properties.local_name,
        service_uuids: properties.services,
        manufacturer_data,
        service_data: properties
            .service_data
            .into_iter()
            .map(|(service, data)| (service, Bytes::from(data)))
            .collect(),
        tx_power_level: properties.tx_power_level,
        // Not exposed by btleplug.
        is_connectable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blecast_types::{AdapterStatus, from_short};

    fn properties() -> PeripheralProperties {
        PeripheralProperties {
            local_name: Some("Thermo".to_string()),
            tx_power_level: Some(-4),
            rssi: Some(-61),
            manufacturer_data: HashMap::from([(0x0702, vec![1, 2]), (0x004C, vec![3])]),
            service_data: HashMap::from([(from_short(0x180F), vec![87])]),
            services: vec![from_short(0x180D)],
            ..Default::default()
        }
    }

    #[test]
    fn test_advertisement_from_properties() {
        let advertisement = advertisement_from_properties(properties());

        assert_eq!(advertisement.local_name.as_deref(), Some("Thermo"));
        assert_eq!(advertisement.tx_power_level, Some(-4));
        assert!(advertisement.advertises(&from_short(0x180D)));
        assert!(advertisement.advertises(&from_short(0x180F)));
        assert_eq!(
            advertisement.service_data.get(&from_short(0x180F)),
            Some(&Bytes::from_static(&[87]))
        );
    }

    #[test]
    fn test_lowest_company_id_wins() {
        let advertisement = advertisement_from_properties(properties());
        let manufacturer = advertisement.manufacturer_data.unwrap();
        assert_eq!(manufacturer.company_id, 0x004C);
        assert_eq!(manufacturer.data, Bytes::from_static(&[3]));
    }

    #[test]
    fn test_platform_state_mapping() {
        assert_eq!(platform_state(CentralState::PoweredOn), PlatformState::PoweredOn);
        assert_eq!(platform_state(CentralState::PoweredOff), PlatformState::PoweredOff);
        assert_eq!(platform_state(CentralState::Unknown), PlatformState::Unknown);
        assert_eq!(
            AdapterStatus::from(platform_state(CentralState::PoweredOff)),
            AdapterStatus::PoweredOff
        );
    }

    #[test]
    fn test_empty_properties() {
        let advertisement = advertisement_from_properties(PeripheralProperties::default());
        assert_eq!(advertisement, AdvertisementData::default());
    }
}
