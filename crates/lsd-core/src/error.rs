//! # Error Types
//!
//! Validation errors raised when constructing domain primitives from
//! untrusted input (path segments, query parameters, JSON bodies).

use thiserror::Error;

/// Rejection of a malformed domain primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// License identifier was empty or contained forbidden characters.
    #[error("invalid license id {0:?}")]
    InvalidLicenseId(String),

    /// Device identifier was empty or too long.
    #[error("invalid device id {0:?}")]
    InvalidDeviceId(String),

    /// Device name exceeded the length limit.
    #[error("device name exceeds {max} characters")]
    DeviceNameTooLong {
        /// Maximum permitted length.
        max: usize,
    },

    /// Timestamp string was not RFC 3339.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The offending input.
        value: String,
        /// Parser message.
        reason: String,
    },
}
