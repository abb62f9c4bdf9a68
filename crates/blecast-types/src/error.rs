//! Error types for data parsing in blecast-types.

use thiserror::Error;

/// Errors that can occur when parsing Bluetooth identifiers.
///
/// This error type is platform-agnostic and does not include
/// BLE stack errors (those belong in blecast-core).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Input was not a 16-bit, 32-bit or 128-bit UUID.
    #[error("Invalid UUID '{input}': {reason}")]
    InvalidUuid {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ParseError {
    /// Create an invalid UUID error.
    pub fn invalid_uuid(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUuid {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using blecast-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
