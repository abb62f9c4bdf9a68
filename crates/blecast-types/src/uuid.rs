//! Bluetooth UUID helpers.
//!
//! Service filters are always full 128-bit UUIDs internally. SIG-assigned
//! services are usually written as 16-bit short forms, which expand over the
//! Bluetooth base UUID `00000000-0000-1000-8000-00805f9b34fb`.

use uuid::{Uuid, uuid};

use crate::error::{ParseError, ParseResult};

/// The Bluetooth base UUID that short UUIDs are expanded over.
pub const BLUETOOTH_BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

const BASE_LOW_BITS: u128 = BLUETOOTH_BASE_UUID.as_u128();
const LOW_96_MASK: u128 = (1u128 << 96) - 1;

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = uuid!("0000180d-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Expand a 16-bit SIG UUID over the Bluetooth base UUID.
///
/// ```
/// use blecast_types::uuid::{from_short, HEART_RATE_SERVICE};
///
/// assert_eq!(from_short(0x180D), HEART_RATE_SERVICE);
/// ```
#[must_use]
pub const fn from_short(short: u16) -> Uuid {
    from_short32(short as u32)
}

/// Expand a 32-bit SIG UUID over the Bluetooth base UUID.
#[must_use]
pub const fn from_short32(short: u32) -> Uuid {
    Uuid::from_u128(BASE_LOW_BITS | ((short as u128) << 96))
}

/// Return the 16-bit short form if `uuid` is a base UUID with a 16-bit value.
#[must_use]
pub fn to_short(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & LOW_96_MASK != BASE_LOW_BITS {
        return None;
    }
    u16::try_from(value >> 96).ok()
}

/// Parse a service identifier in 16-bit, 32-bit or 128-bit form.
///
/// Short forms may carry a `0x` prefix.
///
/// ```
/// use blecast_types::uuid::{parse_service_uuid, BATTERY_SERVICE};
///
/// assert_eq!(parse_service_uuid("180f").unwrap(), BATTERY_SERVICE);
/// assert_eq!(parse_service_uuid("0x180F").unwrap(), BATTERY_SERVICE);
/// assert_eq!(
///     parse_service_uuid("0000180f-0000-1000-8000-00805f9b34fb").unwrap(),
///     BATTERY_SERVICE
/// );
/// ```
pub fn parse_service_uuid(input: &str) -> ParseResult<Uuid> {
    let trimmed = input.trim();
    let short = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    match short.len() {
        4 => u16::from_str_radix(short, 16)
            .map(from_short)
            .map_err(|e| ParseError::invalid_uuid(input, e.to_string())),
        8 => u32::from_str_radix(short, 16)
            .map(from_short32)
            .map_err(|e| ParseError::invalid_uuid(input, e.to_string())),
        _ => Uuid::parse_str(trimmed).map_err(|e| ParseError::invalid_uuid(input, e.to_string())),
    }
}
