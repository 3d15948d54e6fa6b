//! # Identifier Newtypes
//!
//! License identifiers are opaque strings minted by the issuing server.
//! Device identifiers and names are supplied by reading applications and
//! are only trusted after length checks.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum accepted length for a device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 255;

/// Maximum accepted length for a device name.
pub const MAX_DEVICE_NAME_LEN: usize = 255;

/// Identifier of a license on the issuing server.
///
/// Serialized as a plain string. Must be non-empty and must not contain
/// `/`, `?`, `#` or whitespace, since it is interpolated into URLs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseId(String);

impl LicenseId {
    /// Validate and wrap a license identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let forbidden = |c: char| c == '/' || c == '?' || c == '#' || c.is_whitespace();
        if raw.is_empty() || raw.chars().any(forbidden) {
            return Err(ValidationError::InvalidLicenseId(raw));
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LicenseId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LicenseId> for String {
    fn from(id: LicenseId) -> Self {
        id.0
    }
}

impl std::fmt::Display for LicenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier a reading device reports for itself.
///
/// Equality is exact byte-for-byte match; no case folding is applied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate and wrap a device identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() || raw.len() > MAX_DEVICE_ID_LEN {
            return Err(ValidationError::InvalidDeviceId(raw));
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable device label. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceName(String);

impl DeviceName {
    /// Validate and wrap a device name.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.chars().count() > MAX_DEVICE_NAME_LEN {
            return Err(ValidationError::DeviceNameTooLong {
                max: MAX_DEVICE_NAME_LEN,
            });
        }
        Ok(Self(raw))
    }

    /// Borrow the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceName> for String {
    fn from(name: DeviceName) -> Self {
        name.0
    }
}

impl std::fmt::Display for DeviceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_id_accepts_uuid_like_values() {
        let id = LicenseId::new("a0b1c2d3-0000-4000-8000-000000000001").unwrap();
        assert_eq!(id.as_str(), "a0b1c2d3-0000-4000-8000-000000000001");
    }

    #[test]
    fn license_id_rejects_url_metacharacters() {
        for bad in ["", "a/b", "a?b", "a#b", "a b"] {
            assert!(LicenseId::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn device_id_rejects_blank_and_oversized() {
        assert!(DeviceId::new("   ").is_err());
        assert!(DeviceId::new("x".repeat(MAX_DEVICE_ID_LEN + 1)).is_err());
        assert!(DeviceId::new("x".repeat(MAX_DEVICE_ID_LEN)).is_ok());
    }

    #[test]
    fn device_name_may_be_empty() {
        assert_eq!(DeviceName::new("").unwrap().as_str(), "");
        assert!(DeviceName::new("n".repeat(MAX_DEVICE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: LicenseId = serde_json::from_str("\"L1\"").unwrap();
        assert_eq!(ok.as_str(), "L1");
        assert!(serde_json::from_str::<LicenseId>("\"a/b\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"L1\"");
    }
}
