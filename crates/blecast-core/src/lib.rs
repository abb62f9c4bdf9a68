//! Shared BLE scan and adapter event streams.
//!
//! This crate sits between a platform Bluetooth Low Energy stack and the
//! application. It turns the stack's raw, possibly duplicate callbacks into
//! a few shared, reference-counted event streams with a clear start/stop
//! lifecycle, and it keeps one stable [`Device`] per physical peripheral so
//! that events from different callbacks can be correlated.
//!
//! # Features
//!
//! - **Shared scanning**: any number of subscribers share one platform scan,
//!   started by the first and stopped by the last
//! - **Background scans**: one shared, service-filtered stream per service UUID
//! - **Device identity**: repeated sightings resolve to the same [`Device`]
//! - **Adapter status**: current value on subscription, then every change
//! - **Connection events**: connects and disconnects as [`Device`] handles
//! - **Pluggable platform**: anything implementing [`Central`]; ships with
//!   [`BtleplugCentral`] and the in-memory [`MockCentral`]
//!
//! # Streams
//!
//! | Method | Item | Replay |
//! |--------|------|--------|
//! | [`Adapter::scan`] | [`ScanResult`] | none |
//! | [`Adapter::background_scan`] | [`ScanResult`] | none |
//! | [`Adapter::scanning_status_changes`] | `bool` | none |
//! | [`Adapter::status_changes`] | [`AdapterStatus`] | current status |
//! | [`Adapter::device_status_changes`] | [`SharedDevice`] | none |
//!
//! Every stream is an [`EventStream`]. Dropping it unsubscribes.
//!
//! # Quick Start
//!
//! ```no_run
//! use blecast_core::{Adapter, BtleplugCentral};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let central = BtleplugCentral::new().await?;
//!     let adapter = Adapter::new(central);
//!
//!     let mut scan = adapter.scan();
//!     while let Some(result) = scan.next().await {
//!         println!("{} {} dBm", result.device(), result.rssi());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Tests drive the same API with [`MockCentral`]:
//!
//! ```
//! use std::sync::Arc;
//! use blecast_core::{Adapter, MockCentral};
//! use blecast_types::AdvertisementData;
//!
//! let central = Arc::new(MockCentral::new());
//! let adapter = Adapter::new(Arc::clone(&central));
//!
//! let mut first = adapter.scan();
//! let mut second = adapter.scan();
//! central.discover("H1", Some(-60), AdvertisementData::new());
//!
//! assert_eq!(first.try_recv().unwrap().rssi(), -60);
//! assert_eq!(second.try_recv().unwrap().rssi(), -60);
//! assert_eq!(central.start_scan_count(), 1);
//! ```

pub mod adapter;
pub mod btle;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod mock;
pub mod platform;
pub mod registry;
pub mod scan;
pub mod state;
pub mod stream;

pub use adapter::Adapter;
pub use btle::BtleplugCentral;
pub use config::{AdapterConfig, BtleplugOptions};
pub use connection::ConnectionBridge;
pub use device::{Device, SharedDevice};
pub use error::{Error, Result};
pub use mock::{MockCentral, ScanRequest};
pub use platform::{Central, EventKind, NotificationHub, PlatformEvent, Registration};
pub use registry::DeviceRegistry;
pub use scan::{PlatformScan, ScanResult, ScanStreamManager};
pub use state::StateBridge;
pub use stream::{EventStream, Fanout, SharedStream};

// Re-export from blecast-types
pub use blecast_types::uuid as uuids;
pub use blecast_types::{
    AdapterStatus, AdvertisementData, ConnectionState, ManufacturerData, PlatformState,
};
