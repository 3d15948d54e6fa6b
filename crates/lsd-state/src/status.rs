//! # License Status Record
//!
//! One [`LicenseStatus`] exists per license. It mirrors the rights end date
//! last accepted by the issuing server, the ceiling a renewal may reach,
//! and the set of devices registered against the license.
//!
//! ## States
//!
//! `ready` and `active` are the only states a device can act on. The other
//! four are terminal for the usable lifetime of the license.
//!
//! Expiry is never scheduled. [`project`] derives the effective state from
//! the stored one and the current time; callers render the projection and
//! the write path persists it lazily.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use lsd_core::{DeviceId, DeviceName, LicenseId};

use crate::policy::Policy;

// ─── Status Kind ─────────────────────────────────────────────────────

/// The lifecycle state of a license status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Issued, no device registered yet.
    Ready,
    /// At least one device registered and the rights window is open.
    Active,
    /// Revoked by an operator (terminal).
    Revoked,
    /// Returned by a device before the end of the rights window (terminal).
    Returned,
    /// Cancelled by an operator before first use (terminal).
    Cancelled,
    /// The rights window closed (terminal).
    Expired,
}

impl StatusKind {
    /// Every status, in declaration order.
    pub const ALL: [StatusKind; 6] = [
        Self::Ready,
        Self::Active,
        Self::Revoked,
        Self::Returned,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Wire name, also used as the localization key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Returned => "returned",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Ready | Self::Active)
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string outside the six known values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown license status {0:?}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for StatusKind {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

// ─── Device Record ───────────────────────────────────────────────────

/// A device registered against a license status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Name the device reported on its first registration.
    pub name: DeviceName,
    /// When the device first registered.
    pub registered_at: DateTime<Utc>,
    /// Last accepted action from this device.
    pub last_seen: DateTime<Utc>,
}

// ─── License Status ──────────────────────────────────────────────────

/// Tracked lifecycle state of one license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseStatus {
    /// Internal identifier; events reference it.
    pub id: Uuid,
    /// The license on the issuing server.
    pub license_ref: LicenseId,
    /// Stored status. Read paths must go through [`project`].
    pub status: StatusKind,
    /// Last time the license itself changed on the issuing server.
    pub license_updated: DateTime<Utc>,
    /// Last time this status record changed.
    pub status_updated: DateTime<Utc>,
    /// Rights end date last accepted by the issuing server. `None` = unlimited.
    pub current_end: Option<DateTime<Utc>>,
    /// Furthest end date a renewal may reach.
    pub potential_end: Option<DateTime<Utc>>,
    /// Registered devices, keyed by exact device id.
    #[serde(default)]
    pub devices: BTreeMap<DeviceId, DeviceRecord>,
    /// Optimistic concurrency counter, bumped by the store on every save.
    #[serde(default)]
    pub version: i64,
}

impl LicenseStatus {
    /// Create the `ready` status of a freshly issued license.
    ///
    /// The potential end is derived from the rights start (or `now` when
    /// the license carries none) and the policy's maximum renewal span.
    pub fn issued(
        license_ref: LicenseId,
        rights_start: Option<DateTime<Utc>>,
        rights_end: Option<DateTime<Utc>>,
        license_updated: DateTime<Utc>,
        now: DateTime<Utc>,
        policy: &Policy,
    ) -> Self {
        let rights_end = rights_end.map(lsd_core::truncate_to_second);
        Self {
            id: Uuid::new_v4(),
            license_ref,
            status: StatusKind::Ready,
            license_updated: lsd_core::truncate_to_second(license_updated),
            status_updated: now,
            current_end: rights_end,
            potential_end: policy.potential_end(rights_start.unwrap_or(now), rights_end),
            devices: BTreeMap::new(),
            version: 0,
        }
    }

    /// Number of distinct registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Whether `device` is already registered.
    pub fn is_registered(&self, device: &DeviceId) -> bool {
        self.devices.contains_key(device)
    }

    /// Whether the rights window has an end date (returnable, renewable).
    pub fn has_rights_end(&self) -> bool {
        self.current_end.is_some()
    }

    /// The status a caller should see at `now`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> StatusKind {
        project(self, now)
    }
}

/// Effective status of `status` at `now`.
///
/// A non-terminal status whose rights end lies strictly in the past is
/// reported as [`StatusKind::Expired`]. Terminal statuses are returned
/// unchanged.
pub fn project(status: &LicenseStatus, now: DateTime<Utc>) -> StatusKind {
    match (status.status, status.current_end) {
        (StatusKind::Ready | StatusKind::Active, Some(end)) if now > end => StatusKind::Expired,
        (kind, _) => kind,
    }
}
