//! Shared scan streams.
//!
//! The [`ScanStreamManager`] owns one foreground stream (every
//! advertisement) and one background stream per service UUID. Each is a
//! [`SharedStream`]: created on first use, started when it gains its first
//! subscriber and stopped when it loses its last one.
//!
//! The platform only runs one scan at a time, so the manager arbitrates
//! between the active sessions:
//!
//! | Active sessions | Platform scan |
//! |-----------------|---------------|
//! | none | stopped |
//! | foreground (with or without background) | unfiltered, `allow_duplicates` |
//! | one background filter | that filter, `background_allow_duplicates` |
//! | several background filters | unfiltered, `background_allow_duplicates` |
//!
//! The platform accepts a single service filter, so several background
//! sessions share an unfiltered scan and each session filters its own
//! advertisements.
//!
//! A scan command is only sent when the required platform scan changes.
//! Failed commands are logged and do not end the streams.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use blecast_types::AdvertisementData;

use crate::config::AdapterConfig;
use crate::device::SharedDevice;
use crate::platform::{Central, EventKind, PlatformEvent, Registration};
use crate::registry::DeviceRegistry;
use crate::stream::{EventStream, Fanout, SharedStream};

/// One advertisement sighting.
pub struct ScanResult<C: Central> {
    device: SharedDevice<C>,
    rssi: i16,
    advertisement: AdvertisementData,
}

impl<C: Central> ScanResult<C> {
    /// The logical device that advertised.
    pub fn device(&self) -> &SharedDevice<C> {
        &self.device
    }

    /// Received signal strength in dBm, 0 when the platform reported none.
    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    /// The advertisement payload.
    pub fn advertisement(&self) -> &AdvertisementData {
        &self.advertisement
    }
}

impl<C: Central> Clone for ScanResult<C> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            rssi: self.rssi,
            advertisement: self.advertisement.clone(),
        }
    }
}

impl<C: Central> fmt::Debug for ScanResult<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanResult")
            .field("device", &self.device.peripheral())
            .field("rssi", &self.rssi)
            .field("advertisement", &self.advertisement)
            .finish()
    }
}

/// The scan the platform is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformScan {
    #[default]
    Idle,
    Unfiltered {
        allow_duplicates: bool,
    },
    Filtered {
        service: Uuid,
        allow_duplicates: bool,
    },
}

#[derive(Debug)]
struct ScanArbiter {
    foreground: bool,
    /// Active background filters in activation order.
    background: Vec<Uuid>,
    applied: PlatformScan,
    allow_duplicates: bool,
    background_allow_duplicates: bool,
}

impl ScanArbiter {
    fn new(config: &AdapterConfig) -> Self {
        Self {
            foreground: false,
            background: Vec::new(),
            applied: PlatformScan::Idle,
            allow_duplicates: config.allow_duplicates,
            background_allow_duplicates: config.background_allow_duplicates,
        }
    }

    fn is_idle(&self) -> bool {
        !self.foreground && self.background.is_empty()
    }

    fn activate(&mut self, filter: Option<Uuid>) {
        match filter {
            None => self.foreground = true,
            Some(service) => {
                if !self.background.contains(&service) {
                    self.background.push(service);
                }
            }
        }
    }

    fn deactivate(&mut self, filter: Option<Uuid>) {
        match filter {
            None => self.foreground = false,
            Some(service) => self.background.retain(|active| *active != service),
        }
    }

    fn desired(&self) -> PlatformScan {
        if self.foreground {
            PlatformScan::Unfiltered {
                allow_duplicates: self.allow_duplicates,
            }
        } else {
            match self.background.as_slice() {
                [] => PlatformScan::Idle,
                [service] => PlatformScan::Filtered {
                    service: *service,
                    allow_duplicates: self.background_allow_duplicates,
                },
                _ => PlatformScan::Unfiltered {
                    allow_duplicates: self.background_allow_duplicates,
                },
            }
        }
    }

    /// Bring the platform in line with the active sessions.
    fn apply<C: Central>(&mut self, central: &C) {
        let desired = self.desired();
        if desired == self.applied {
            return;
        }

        let result = match desired {
            PlatformScan::Idle => {
                info!("Stopping platform scan");
                central.stop_scan()
            }
            PlatformScan::Unfiltered { allow_duplicates } => {
                info!(allow_duplicates, "Starting unfiltered platform scan");
                central.start_scan(None, allow_duplicates)
            }
            PlatformScan::Filtered {
                service,
                allow_duplicates,
            } => {
                info!(%service, allow_duplicates, "Starting filtered platform scan");
                central.start_scan(Some(service), allow_duplicates)
            }
        };

        if let Err(e) = result {
            warn!("Platform scan command failed: {}", e);
        }
        self.applied = desired;
    }
}

struct ScanShared<C: Central> {
    central: Arc<C>,
    registry: Arc<DeviceRegistry<C>>,
    clear_registry_on_scan: bool,
    arbiter: Mutex<ScanArbiter>,
    scanning_status: Fanout<bool>,
}

impl<C: Central> ScanShared<C> {
    fn arbiter(&self) -> MutexGuard<'_, ScanArbiter> {
        self.arbiter
            .lock()
            .expect("scan arbiter lock poisoned - a thread panicked while holding the lock")
    }
}

fn stream_name(filter: Option<Uuid>) -> String {
    match filter {
        None => "scan".to_string(),
        Some(service) => format!("background_scan({service})"),
    }
}

/// Start one scan session feeding `fanout`.
///
/// The returned registration stops the session.
fn start_session<C: Central>(
    shared: &Arc<ScanShared<C>>,
    filter: Option<Uuid>,
    fanout: &Fanout<ScanResult<C>>,
) -> Registration {
    let name = stream_name(filter);
    let gate = Arc::new(AtomicBool::new(true));

    let mut arbiter = shared.arbiter();
    if arbiter.is_idle() && shared.clear_registry_on_scan {
        shared.registry.clear();
    }

    let discovery = {
        let weak: Weak<ScanShared<C>> = Arc::downgrade(shared);
        let gate = Arc::clone(&gate);
        let fanout = fanout.clone();
        shared
            .central
            .notifications()
            .register(EventKind::Discovered, move |event| {
                let PlatformEvent::Discovered {
                    peripheral,
                    rssi,
                    advertisement,
                } = event
                else {
                    return;
                };
                if !gate.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(service) = filter
                    && !advertisement.advertises(&service)
                {
                    return;
                }
                let Some(shared) = weak.upgrade() else {
                    return;
                };

                let device = shared.registry.resolve(peripheral);
                trace!(peripheral = ?peripheral, ?rssi, "Advertisement received");
                fanout.emit(ScanResult {
                    device,
                    rssi: rssi.unwrap_or(0),
                    advertisement: advertisement.clone(),
                });
            })
    };

    arbiter.activate(filter);
    arbiter.apply(&*shared.central);
    drop(arbiter);
    info!(stream = %name, "Scan session started");
    shared.scanning_status.emit(true);

    let shared = Arc::clone(shared);
    Registration::new(move || {
        // Close the gate first so an in-flight callback drops its event.
        gate.store(false, Ordering::SeqCst);
        discovery.cancel();
        {
            let mut arbiter = shared.arbiter();
            arbiter.deactivate(filter);
            arbiter.apply(&*shared.central);
        }
        info!(stream = %name, "Scan session stopped");
        shared.scanning_status.emit(false);
    })
}

/// Owner of the foreground and background scan streams.
pub struct ScanStreamManager<C: Central> {
    shared: Arc<ScanShared<C>>,
    foreground: OnceLock<SharedStream<ScanResult<C>>>,
    background: Mutex<HashMap<Uuid, SharedStream<ScanResult<C>>>>,
}

impl<C: Central> ScanStreamManager<C> {
    /// Create a manager that scans through `central` and resolves devices
    /// through `registry`.
    pub fn new(central: Arc<C>, registry: Arc<DeviceRegistry<C>>, config: &AdapterConfig) -> Self {
        Self {
            shared: Arc::new(ScanShared {
                central,
                registry,
                clear_registry_on_scan: config.clear_registry_on_scan,
                arbiter: Mutex::new(ScanArbiter::new(config)),
                scanning_status: Fanout::new(),
            }),
            foreground: OnceLock::new(),
            background: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to every advertisement.
    pub fn scan(&self) -> EventStream<ScanResult<C>> {
        self.foreground_stream().subscribe()
    }

    /// Subscribe to advertisements that list `service`.
    pub fn background_scan(&self, service: Uuid) -> EventStream<ScanResult<C>> {
        self.background_stream(service).subscribe()
    }

    /// Subscribe to session transitions: `true` when a scan session
    /// starts, `false` when one stops.
    pub fn scanning_status_changes(&self) -> EventStream<bool> {
        self.shared.scanning_status.subscribe()
    }

    /// The memoized foreground stream.
    pub fn foreground_stream(&self) -> &SharedStream<ScanResult<C>> {
        self.foreground.get_or_init(|| {
            debug!("Creating foreground scan stream");
            let shared = Arc::clone(&self.shared);
            SharedStream::new(stream_name(None), move |fanout: &Fanout<ScanResult<C>>| {
                start_session(&shared, None, fanout)
            })
        })
    }

    /// The memoized background stream for `service`.
    pub fn background_stream(&self, service: Uuid) -> SharedStream<ScanResult<C>> {
        let mut streams = self
            .background
            .lock()
            .expect("background stream lock poisoned - a thread panicked while holding the lock");
        streams
            .entry(service)
            .or_insert_with(|| {
                debug!(%service, "Creating background scan stream");
                let shared = Arc::clone(&self.shared);
                SharedStream::new(
                    stream_name(Some(service)),
                    move |fanout: &Fanout<ScanResult<C>>| start_session(&shared, Some(service), fanout),
                )
            })
            .clone()
    }

    /// The scan the platform was last asked to run.
    pub fn platform_scan(&self) -> PlatformScan {
        self.shared.arbiter().applied
    }

    /// Whether any scan session is running.
    pub fn is_active(&self) -> bool {
        !self.shared.arbiter().is_idle()
    }
}

impl<C: Central> fmt::Debug for ScanStreamManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanStreamManager")
            .field("platform_scan", &self.platform_scan())
            .field("foreground", &self.foreground.get())
            .finish()
    }
}
