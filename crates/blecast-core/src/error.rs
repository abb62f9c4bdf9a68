//! Error types for blecast-core.
//!
//! The event layer itself never fails: a missing RSSI becomes `0`, an
//! unmapped adapter state becomes [`AdapterStatus::Unknown`], and a
//! disconnect error is delivered like a clean disconnect. Errors only
//! surface from the edges:
//!
//! | Error Type | Raised by |
//! |------------|-----------|
//! | [`Error::Bluetooth`] | btleplug while acquiring an adapter |
//! | [`Error::NoAdapter`] | [`crate::BtleplugCentral`] when no adapter matches |
//! | [`Error::Platform`] | a [`crate::Central`] rejecting a scan command |
//! | [`Error::InvalidConfig`] | [`crate::AdapterConfig::validate`] |
//! | [`Error::Config`] | TOML parsing of an [`crate::AdapterConfig`] |
//!
//! Scan command failures reported by a central are logged and swallowed by
//! the scan streams; subscribers keep their stream.
//!
//! [`AdapterStatus::Unknown`]: blecast_types::AdapterStatus::Unknown

use thiserror::Error;

/// Errors that can occur in blecast-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter matched the request.
    #[error("No Bluetooth adapter available: {0}")]
    NoAdapter(String),

    /// The platform central rejected or could not run a command.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Identifier parsing failed.
    #[error(transparent)]
    Parse(#[from] blecast_types::ParseError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a platform error.
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using blecast-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
