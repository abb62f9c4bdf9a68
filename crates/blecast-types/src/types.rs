//! Core types for adapter state and advertisement data.

use core::fmt;
use std::collections::HashMap;

use bytes::Bytes;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of the local Bluetooth adapter as seen by applications.
///
/// This is a pure projection of [`PlatformState`]; it is never stored
/// independently of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdapterStatus {
    /// State is not known yet, or the platform reported a value we do not map.
    #[default]
    Unknown,
    /// The adapter is resetting and will report a new state shortly.
    Resetting,
    /// The host does not support Bluetooth Low Energy.
    Unsupported,
    /// The application is not allowed to use Bluetooth.
    Unauthorized,
    /// Bluetooth is switched off.
    PoweredOff,
    /// Bluetooth is on and ready.
    PoweredOn,
}

impl AdapterStatus {
    /// Returns true if the adapter can scan and connect.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, AdapterStatus::PoweredOn)
    }
}

impl From<PlatformState> for AdapterStatus {
    fn from(state: PlatformState) -> Self {
        match state {
            PlatformState::PoweredOff => AdapterStatus::PoweredOff,
            PlatformState::PoweredOn => AdapterStatus::PoweredOn,
            PlatformState::Resetting => AdapterStatus::Resetting,
            PlatformState::Unauthorized => AdapterStatus::Unauthorized,
            PlatformState::Unsupported => AdapterStatus::Unsupported,
            PlatformState::Unknown | PlatformState::Unrecognized(_) => AdapterStatus::Unknown,
        }
    }
}

impl fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterStatus::Unknown => write!(f, "Unknown"),
            AdapterStatus::Resetting => write!(f, "Resetting"),
            AdapterStatus::Unsupported => write!(f, "Unsupported"),
            AdapterStatus::Unauthorized => write!(f, "Unauthorized"),
            AdapterStatus::PoweredOff => write!(f, "Powered off"),
            AdapterStatus::PoweredOn => write!(f, "Powered on"),
        }
    }
}

/// Raw adapter state as reported by the platform BLE stack.
///
/// Platforms may add states over time, so anything outside the documented
/// range is carried as [`PlatformState::Unrecognized`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlatformState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
    /// A raw value the platform reported that has no known meaning.
    Unrecognized(i64),
}

impl PlatformState {
    /// Map a raw platform value using the CoreBluetooth numbering
    /// (`0` unknown through `5` powered on).
    ///
    /// # Examples
    ///
    /// ```
    /// use blecast_types::PlatformState;
    ///
    /// assert_eq!(PlatformState::from_raw(4), PlatformState::PoweredOff);
    /// assert_eq!(PlatformState::from_raw(-1), PlatformState::Unrecognized(-1));
    /// ```
    #[must_use]
    pub fn from_raw(value: i64) -> Self {
        match value {
            0 => PlatformState::Unknown,
            1 => PlatformState::Resetting,
            2 => PlatformState::Unsupported,
            3 => PlatformState::Unauthorized,
            4 => PlatformState::PoweredOff,
            5 => PlatformState::PoweredOn,
            other => PlatformState::Unrecognized(other),
        }
    }
}

impl From<i64> for PlatformState {
    fn from(value: i64) -> Self {
        Self::from_raw(value)
    }
}

/// Connection state of a peripheral, queried on demand from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Returns true only for [`ConnectionState::Connected`].
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Manufacturer specific data from an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManufacturerData {
    /// Bluetooth SIG company identifier.
    pub company_id: u16,
    /// Payload following the company identifier.
    pub data: Bytes,
}

impl ManufacturerData {
    pub fn new(company_id: u16, data: impl Into<Bytes>) -> Self {
        Self {
            company_id,
            data: data.into(),
        }
    }
}

/// Advertisement payload reported with a discovery.
///
/// The platform stack decodes the raw advertisement; this struct is only
/// the portable shape of the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdvertisementData {
    /// Local name, complete or shortened.
    pub local_name: Option<String>,
    /// Advertised service UUIDs.
    pub service_uuids: Vec<Uuid>,
    /// Manufacturer specific data, if any.
    pub manufacturer_data: Option<ManufacturerData>,
    /// Service data keyed by service UUID.
    pub service_data: HashMap<Uuid, Bytes>,
    /// Transmit power level in dBm.
    pub tx_power_level: Option<i16>,
    /// Whether the advertiser accepts connections.
    pub is_connectable: bool,
}

impl AdvertisementData {
    /// Create an empty advertisement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local name.
    #[must_use]
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Add an advertised service.
    #[must_use]
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service_uuids.push(service);
        self
    }

    /// Set the manufacturer data.
    #[must_use]
    pub fn with_manufacturer_data(mut self, company_id: u16, data: impl Into<Bytes>) -> Self {
        self.manufacturer_data = Some(ManufacturerData::new(company_id, data));
        self
    }

    /// Add service data for a service.
    #[must_use]
    pub fn with_service_data(mut self, service: Uuid, data: impl Into<Bytes>) -> Self {
        self.service_data.insert(service, data.into());
        self
    }

    /// Set the connectable flag.
    #[must_use]
    pub fn connectable(mut self, connectable: bool) -> Self {
        self.is_connectable = connectable;
        self
    }

    /// Returns true if the advertisement mentions `service`, either in the
    /// service list or as a service data key.
    #[must_use]
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_uuids.contains(service) || self.service_data.contains_key(service)
    }
}
