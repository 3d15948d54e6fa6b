//! # Transition Policy
//!
//! Pure decision functions gating every action on a license status. The
//! same [`Policy`] value backs the state machine (to accept or reject a
//! request) and the link builder (to decide which action links to expose),
//! so the two can never disagree.
//!
//! Every check evaluates the *projected* status, so a lapsed `active`
//! license is treated as `expired` even before the expiry is persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lsd_core::DeviceId;

use crate::status::{project, LicenseStatus, StatusKind};

/// An action that may change a license status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Device registration.
    Register,
    /// Device return.
    Return,
    /// Device renewal.
    Renew,
    /// Operator cancellation.
    Cancel,
    /// Operator revocation.
    Revoke,
}

impl Action {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Return => "return",
            Self::Renew => "renew",
            Self::Cancel => "cancel",
            Self::Revoke => "revoke",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment limits for device actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Whether devices may register at all.
    pub register_enabled: bool,
    /// Whether devices may return a license.
    pub return_enabled: bool,
    /// Whether devices may renew a license.
    pub renew_enabled: bool,
    /// Maximum number of distinct devices per license.
    pub max_devices: u32,
    /// Extension applied by a renew request without an explicit end date.
    pub renew_default_days: u32,
    /// Span from the rights start to the furthest reachable end date.
    pub renew_max_days: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            register_enabled: true,
            return_enabled: true,
            renew_enabled: true,
            max_devices: 5,
            renew_default_days: 7,
            renew_max_days: 60,
        }
    }
}

/// Why an action is not allowed right now.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// The action is switched off for this deployment.
    #[error("{0} is disabled on this server")]
    Disabled(Action),

    /// The action does not apply to the current status.
    #[error("cannot {action} a license in status {status}")]
    WrongState {
        /// Rejected action.
        action: Action,
        /// Effective status at decision time.
        status: StatusKind,
    },

    /// The license has no rights end date.
    #[error("cannot {0} a license without a rights end date")]
    NoRightsEnd(Action),

    /// A new device would exceed the per-license ceiling.
    #[error("license already has the maximum of {max} registered devices")]
    CapacityExceeded {
        /// Configured ceiling.
        max: u32,
    },

    /// The rights window closes at or before now.
    #[error("rights window ended at {end}")]
    RightsLapsed {
        /// Current rights end.
        end: DateTime<Utc>,
    },

    /// Requested renewal end is not in the future.
    #[error("requested end {requested} is not in the future")]
    EndNotInFuture {
        /// Requested end.
        requested: DateTime<Utc>,
    },

    /// Requested renewal end exceeds the potential end.
    #[error("requested end {requested} exceeds the potential end {potential}")]
    BeyondPotentialEnd {
        /// Requested end.
        requested: DateTime<Utc>,
        /// Renewal ceiling.
        potential: DateTime<Utc>,
    },

    /// The rights window already reaches the potential end.
    #[error("rights end {end} already reaches the potential end")]
    NoRenewalHeadroom {
        /// Current rights end.
        end: DateTime<Utc>,
    },

    /// Cancellation after a device has used the license.
    #[error("cannot cancel a license with {count} registered device(s)")]
    DevicesRegistered {
        /// Registered device count.
        count: usize,
    },
}

/// Transition policy bound to an immutable configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    config: PolicyConfig,
}

impl Policy {
    /// Bind a policy to `config`.
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// The configuration this policy evaluates.
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Renewal ceiling for a license starting at `start` and ending at `rights_end`.
    ///
    /// Never earlier than the initial end; `None` for unlimited licenses.
    pub fn potential_end(
        &self,
        start: DateTime<Utc>,
        rights_end: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let ceiling = start + Duration::days(i64::from(self.config.renew_max_days));
        rights_end.map(|end| end.max(lsd_core::truncate_to_second(ceiling)))
    }

    /// Whether a device may register.
    ///
    /// An already-registered device always passes, so retries are harmless.
    pub fn can_register(
        &self,
        status: &LicenseStatus,
        device: &DeviceId,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        self.registration_open(status, now)?;
        if status.is_registered(device) {
            return Ok(());
        }
        if status.device_count() >= self.config.max_devices as usize {
            return Err(PolicyViolation::CapacityExceeded {
                max: self.config.max_devices,
            });
        }
        Ok(())
    }

    /// Whether the license still accepts registrations from some device.
    pub fn registration_open(
        &self,
        status: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        if !self.config.register_enabled {
            return Err(PolicyViolation::Disabled(Action::Register));
        }
        match project(status, now) {
            StatusKind::Ready | StatusKind::Active => Ok(()),
            other => Err(PolicyViolation::WrongState {
                action: Action::Register,
                status: other,
            }),
        }
    }

    /// Whether a device may return the license.
    pub fn can_return(
        &self,
        status: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        if !self.config.return_enabled {
            return Err(PolicyViolation::Disabled(Action::Return));
        }
        self.require_active_with_end(Action::Return, status, now)?;
        Ok(())
    }

    /// Whether a device may renew the license, independent of the target date.
    pub fn can_renew(
        &self,
        status: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        if !self.config.renew_enabled {
            return Err(PolicyViolation::Disabled(Action::Renew));
        }
        let end = self.require_active_with_end(Action::Renew, status, now)?;
        if now >= end {
            return Err(PolicyViolation::RightsLapsed { end });
        }
        Ok(())
    }

    /// Resolve the end date a renewal request would push to the issuer.
    ///
    /// An explicit `requested` end beyond the potential end is rejected.
    /// Without one, the current end is extended by the default span and
    /// clamped to the potential end.
    pub fn renewal_target(
        &self,
        status: &LicenseStatus,
        requested: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, PolicyViolation> {
        self.can_renew(status, now)?;
        let end = status
            .current_end
            .ok_or(PolicyViolation::NoRightsEnd(Action::Renew))?;
        let ceiling = status.potential_end.unwrap_or(end);

        match requested.map(lsd_core::truncate_to_second) {
            Some(requested) => {
                if requested <= now {
                    return Err(PolicyViolation::EndNotInFuture { requested });
                }
                if requested > ceiling {
                    return Err(PolicyViolation::BeyondPotentialEnd {
                        requested,
                        potential: ceiling,
                    });
                }
                Ok(requested)
            }
            None => {
                let extended = end + Duration::days(i64::from(self.config.renew_default_days));
                let target = extended.min(ceiling);
                if target <= end {
                    return Err(PolicyViolation::NoRenewalHeadroom { end });
                }
                Ok(target)
            }
        }
    }

    /// Whether an operator may cancel the license.
    pub fn can_cancel(
        &self,
        status: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        match project(status, now) {
            StatusKind::Ready if status.device_count() == 0 => Ok(()),
            StatusKind::Ready => Err(PolicyViolation::DevicesRegistered {
                count: status.device_count(),
            }),
            other => Err(PolicyViolation::WrongState {
                action: Action::Cancel,
                status: other,
            }),
        }
    }

    /// Whether an operator may revoke the license.
    pub fn can_revoke(
        &self,
        status: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        match project(status, now) {
            StatusKind::Ready | StatusKind::Active => Ok(()),
            other => Err(PolicyViolation::WrongState {
                action: Action::Revoke,
                status: other,
            }),
        }
    }

    fn require_active_with_end(
        &self,
        action: Action,
        status: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, PolicyViolation> {
        let effective = project(status, now);
        if effective != StatusKind::Active {
            return Err(PolicyViolation::WrongState {
                action,
                status: effective,
            });
        }
        status.current_end.ok_or(PolicyViolation::NoRightsEnd(action))
    }
}
