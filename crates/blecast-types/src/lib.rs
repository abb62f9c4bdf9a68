//! Platform-agnostic types for the blecast BLE adapter layer.
//!
//! This crate holds the plain data shared between the core event layer
//! and any platform central implementation:
//!
//! - Adapter and platform state enums
//! - Peripheral connection state
//! - Advertisement payloads
//! - Bluetooth base-UUID helpers
//!
//! # Example
//!
//! ```
//! use blecast_types::{AdapterStatus, PlatformState};
//!
//! let status = AdapterStatus::from(PlatformState::from_raw(5));
//! assert_eq!(status, AdapterStatus::PoweredOn);
//!
//! // Values the platform does not document fall back to Unknown.
//! assert_eq!(AdapterStatus::from(PlatformState::from_raw(42)), AdapterStatus::Unknown);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{AdapterStatus, AdvertisementData, ConnectionState, ManufacturerData, PlatformState};
pub use crate::uuid::{BLUETOOTH_BASE_UUID, from_short, parse_service_uuid, to_short};
