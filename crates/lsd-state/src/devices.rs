//! # Device Registry
//!
//! Tracks which devices have registered against a license status. Device
//! ids compare by exact match: a second registration from the same id is
//! a successful no-op, so a client can retry safely, while a new id beyond
//! the configured ceiling is refused without touching the record.

use chrono::{DateTime, Utc};

use lsd_core::{DeviceId, DeviceName};

use crate::status::{DeviceRecord, LicenseStatus};

/// Outcome of [`DeviceRegistry::register_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The device was already known. Nothing changed.
    AlreadyRegistered,
    /// The device was added to the record.
    NewlyRegistered,
    /// The license already holds the maximum number of devices.
    CapacityExceeded {
        /// Configured ceiling.
        max: u32,
    },
}

/// Per-license device set with a registration ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRegistry {
    max_devices: u32,
}

impl DeviceRegistry {
    /// Create a registry enforcing `max_devices`.
    pub fn new(max_devices: u32) -> Self {
        Self { max_devices }
    }

    /// Configured ceiling.
    pub fn max_devices(&self) -> u32 {
        self.max_devices
    }

    /// Decide what registering `device` would do, without mutating `status`.
    pub fn check(&self, status: &LicenseStatus, device: &DeviceId) -> Registration {
        if status.is_registered(device) {
            Registration::AlreadyRegistered
        } else if status.device_count() >= self.max_devices as usize {
            Registration::CapacityExceeded {
                max: self.max_devices,
            }
        } else {
            Registration::NewlyRegistered
        }
    }

    /// Record `device` against `status`.
    ///
    /// Only [`Registration::NewlyRegistered`] mutates the record. A repeat
    /// registration leaves `last_seen` alone so that a retried request
    /// produces a byte-identical record.
    pub fn register_device(
        &self,
        status: &mut LicenseStatus,
        device: DeviceId,
        name: DeviceName,
        now: DateTime<Utc>,
    ) -> Registration {
        let outcome = self.check(status, &device);
        if outcome == Registration::NewlyRegistered {
            status.devices.insert(
                device,
                DeviceRecord {
                    name,
                    registered_at: now,
                    last_seen: now,
                },
            );
        }
        outcome
    }

    /// Refresh `last_seen` for a known device. Unknown devices are ignored.
    pub fn touch(&self, status: &mut LicenseStatus, device: &DeviceId, now: DateTime<Utc>) {
        if let Some(record) = status.devices.get_mut(device) {
            record.last_seen = now;
        }
    }
}
