//! # Status State Machine
//!
//! Computes the consequence of an action on a [`LicenseStatus`] snapshot
//! without performing it. A successful call yields a [`Transition`]: the
//! next record, the event to append, and the rights end date the issuing
//! server must accept first. The caller runs the saga
//! (notify, then persist) and discards the transition on any failure.
//!
//! ## Transitions
//!
//! | From | Action | To | Issuer end date |
//! |---|---|---|---|
//! | ready / active | register | active | none |
//! | active | return | returned | now |
//! | active | renew | active | renewal target |
//! | ready | cancel | cancelled | now |
//! | ready / active | revoke | revoked | now |
//! | ready / active | (end passes) | expired | none, no event |
//!
//! The version counter is left untouched; the store bumps it on save.

use chrono::{DateTime, Utc};
use thiserror::Error;

use lsd_core::{DeviceId, DeviceName, LicenseId};

use crate::devices::{DeviceRegistry, Registration};
use crate::events::{EventType, NewEvent};
use crate::policy::{Action, Policy, PolicyViolation};
use crate::status::{project, LicenseStatus, StatusKind};

// ─── Errors ──────────────────────────────────────────────────────────

/// Why a requested transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The action does not apply to the current state or violates policy.
    #[error("cannot {action} license in status {status}: {reason}")]
    InvalidTransition {
        /// Refused action.
        action: Action,
        /// Effective status at decision time.
        status: StatusKind,
        /// The policy rule that refused it.
        #[source]
        reason: PolicyViolation,
    },

    /// A new device would exceed the per-license ceiling.
    #[error("device limit of {max} reached")]
    CapacityExceeded {
        /// Configured ceiling.
        max: u32,
    },
}

// ─── Transition ──────────────────────────────────────────────────────

/// The rights end date to push to the issuing server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerUpdate {
    /// License on the issuing server.
    pub license_id: LicenseId,
    /// New rights end; `None` leaves the license unlimited.
    pub rights_end: Option<DateTime<Utc>>,
}

/// A computed, not yet applied, status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The action that produced it.
    pub action: Action,
    /// Stored status before the change.
    pub from: StatusKind,
    /// Record to persist once the issuer has accepted `notify`.
    pub next: LicenseStatus,
    /// Event to append in the same unit of work.
    pub event: NewEvent,
    /// Issuer update that must succeed before anything is persisted.
    pub notify: Option<IssuerUpdate>,
}

/// Result of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// State changes; run the saga.
    Applied(Box<Transition>),
    /// Idempotent retry; nothing to notify, persist, or append.
    Unchanged,
}

impl TransitionOutcome {
    /// The transition, if one applies.
    pub fn transition(&self) -> Option<&Transition> {
        match self {
            Self::Applied(t) => Some(t),
            Self::Unchanged => None,
        }
    }
}

// ─── Machine ─────────────────────────────────────────────────────────

/// Pure transition logic bound to a [`Policy`].
#[derive(Debug, Clone)]
pub struct StatusStateMachine {
    policy: Policy,
    registry: DeviceRegistry,
}

impl StatusStateMachine {
    /// Create a machine enforcing `policy`.
    pub fn new(policy: Policy) -> Self {
        let registry = DeviceRegistry::new(policy.config().max_devices);
        Self { policy, registry }
    }

    /// The policy this machine enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Register `device` against `current`.
    ///
    /// A device that is already registered gets [`TransitionOutcome::Unchanged`]:
    /// no event, no device count change.
    pub fn register(
        &self,
        current: &LicenseStatus,
        device: DeviceId,
        name: DeviceName,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.policy
            .can_register(current, &device, now)
            .map_err(|v| self.refuse(Action::Register, current, now, v))?;

        let mut next = current.clone();
        match self
            .registry
            .register_device(&mut next, device.clone(), name.clone(), now)
        {
            Registration::AlreadyRegistered => Ok(TransitionOutcome::Unchanged),
            Registration::CapacityExceeded { max } => {
                Err(TransitionError::CapacityExceeded { max })
            }
            Registration::NewlyRegistered => {
                next.status = StatusKind::Active;
                next.status_updated = now;
                Ok(self.applied(
                    Action::Register,
                    current,
                    next,
                    NewEvent::device(EventType::Register, device, name, now),
                    None,
                ))
            }
        }
    }

    /// Return the license from `device`, closing the rights window at `now`.
    pub fn return_license(
        &self,
        current: &LicenseStatus,
        device: DeviceId,
        name: DeviceName,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.policy
            .can_return(current, now)
            .map_err(|v| self.refuse(Action::Return, current, now, v))?;

        let mut next = current.clone();
        self.registry.touch(&mut next, &device, now);
        next.status = StatusKind::Returned;
        next.current_end = Some(now);
        next.status_updated = now;
        let notify = self.issuer_update(&next);
        Ok(self.applied(
            Action::Return,
            current,
            next,
            NewEvent::device(EventType::Return, device, name, now),
            notify,
        ))
    }

    /// Renew the license from `device`, to `requested` or by the default span.
    pub fn renew(
        &self,
        current: &LicenseStatus,
        device: DeviceId,
        name: DeviceName,
        requested: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let target = self
            .policy
            .renewal_target(current, requested, now)
            .map_err(|v| self.refuse(Action::Renew, current, now, v))?;

        let mut next = current.clone();
        self.registry.touch(&mut next, &device, now);
        next.current_end = Some(target);
        next.status_updated = now;
        let notify = self.issuer_update(&next);
        Ok(self.applied(
            Action::Renew,
            current,
            next,
            NewEvent::device(EventType::Renew, device, name, now),
            notify,
        ))
    }

    /// Operator cancellation before first use.
    pub fn cancel(
        &self,
        current: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.policy
            .can_cancel(current, now)
            .map_err(|v| self.refuse(Action::Cancel, current, now, v))?;
        Ok(self.close(Action::Cancel, StatusKind::Cancelled, current, now))
    }

    /// Operator revocation.
    pub fn revoke(
        &self,
        current: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.policy
            .can_revoke(current, now)
            .map_err(|v| self.refuse(Action::Revoke, current, now, v))?;
        Ok(self.close(Action::Revoke, StatusKind::Revoked, current, now))
    }

    /// The corrected record when `current` has lapsed but is not yet stored as expired.
    ///
    /// Expiry appends no event and needs no issuer update: the issuer's end
    /// date already lies in the past.
    pub fn expire(&self, current: &LicenseStatus, now: DateTime<Utc>) -> Option<LicenseStatus> {
        if current.status != StatusKind::Expired && project(current, now) == StatusKind::Expired {
            let mut next = current.clone();
            next.status = StatusKind::Expired;
            next.status_updated = now;
            Some(next)
        } else {
            None
        }
    }

    fn close(
        &self,
        action: Action,
        to: StatusKind,
        current: &LicenseStatus,
        now: DateTime<Utc>,
    ) -> TransitionOutcome {
        let mut next = current.clone();
        next.status = to;
        next.current_end = Some(now);
        next.status_updated = now;
        let notify = self.issuer_update(&next);
        let event_type = match action {
            Action::Cancel => EventType::Cancel,
            _ => EventType::Revoke,
        };
        self.applied(
            action,
            current,
            next,
            NewEvent::operator(event_type, now),
            notify,
        )
    }

    fn applied(
        &self,
        action: Action,
        current: &LicenseStatus,
        next: LicenseStatus,
        event: NewEvent,
        notify: Option<IssuerUpdate>,
    ) -> TransitionOutcome {
        TransitionOutcome::Applied(Box::new(Transition {
            action,
            from: current.status,
            next,
            event,
            notify,
        }))
    }

    fn issuer_update(&self, next: &LicenseStatus) -> Option<IssuerUpdate> {
        Some(IssuerUpdate {
            license_id: next.license_ref.clone(),
            rights_end: next.current_end,
        })
    }

    fn refuse(
        &self,
        action: Action,
        current: &LicenseStatus,
        now: DateTime<Utc>,
        violation: PolicyViolation,
    ) -> TransitionError {
        match violation {
            PolicyViolation::CapacityExceeded { max } => TransitionError::CapacityExceeded { max },
            reason => TransitionError::InvalidTransition {
                action,
                status: project(current, now),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyConfig;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn machine(max_devices: u32) -> StatusStateMachine {
        StatusStateMachine::new(Policy::new(PolicyConfig {
            max_devices,
            ..PolicyConfig::default()
        }))
    }

    fn issued(end: Option<DateTime<Utc>>) -> LicenseStatus {
        LicenseStatus::issued(
            LicenseId::new("L1").unwrap(),
            Some(at(2023, 11, 20)),
            end,
            at(2023, 11, 20),
            at(2023, 11, 20),
            &Policy::new(PolicyConfig::default()),
        )
    }

    fn dev(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    fn name() -> DeviceName {
        DeviceName::new("Reader").unwrap()
    }

    fn applied(outcome: TransitionOutcome) -> Transition {
        match outcome {
            TransitionOutcome::Applied(t) => *t,
            TransitionOutcome::Unchanged => panic!("expected a transition"),
        }
    }

    fn registered(end: Option<DateTime<Utc>>) -> LicenseStatus {
        let m = machine(5);
        applied(m.register(&issued(end), dev("A"), name(), at(2023, 11, 21)).unwrap()).next
    }

    // ─── Register ────────────────────────────────────────────────────

    #[test]
    fn test_register_activates_ready_license() {
        let t = applied(
            machine(1)
                .register(&issued(None), dev("A"), name(), at(2023, 12, 1))
                .unwrap(),
        );
        assert_eq!(t.from, StatusKind::Ready);
        assert_eq!(t.next.status, StatusKind::Active);
        assert_eq!(t.next.device_count(), 1);
        assert_eq!(t.event.event_type, EventType::Register);
        assert_eq!(t.event.device_id, Some(dev("A")));
        assert!(t.notify.is_none());
    }

    #[test]
    fn test_register_retry_is_unchanged() {
        let active = registered(None);
        let outcome = machine(1)
            .register(&active, dev("A"), name(), at(2023, 12, 1))
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Unchanged);
    }

    #[test]
    fn test_register_new_device_when_full() {
        let active = registered(None);
        let err = machine(1)
            .register(&active, dev("B"), name(), at(2023, 12, 1))
            .unwrap_err();
        assert_eq!(err, TransitionError::CapacityExceeded { max: 1 });
    }

    #[test]
    fn test_active_accepts_second_device_under_cap() {
        let active = registered(None);
        let t = applied(
            machine(2)
                .register(&active, dev("B"), name(), at(2023, 12, 1))
                .unwrap(),
        );
        assert_eq!(t.from, StatusKind::Active);
        assert_eq!(t.next.device_count(), 2);
    }

    #[test]
    fn test_register_on_terminal_is_invalid() {
        let mut returned = registered(Some(at(2024, 1, 1)));
        returned.status = StatusKind::Returned;
        let err = machine(5)
            .register(&returned, dev("A"), name(), at(2023, 12, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                action: Action::Register,
                status: StatusKind::Returned,
                ..
            }
        ));
    }

    // ─── Return / Renew ──────────────────────────────────────────────

    #[test]
    fn test_return_closes_window_and_notifies() {
        let active = registered(Some(at(2024, 1, 1)));
        let now = at(2023, 12, 1);
        let t = applied(machine(5).return_license(&active, dev("A"), name(), now).unwrap());
        assert_eq!(t.next.status, StatusKind::Returned);
        assert_eq!(t.next.current_end, Some(now));
        assert_eq!(t.notify.unwrap().rights_end, Some(now));
        assert_eq!(t.event.event_type, EventType::Return);
    }

    #[test]
    fn test_return_without_end_is_invalid() {
        let active = registered(None);
        let err = machine(5)
            .return_license(&active, dev("A"), name(), at(2023, 12, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                reason: PolicyViolation::NoRightsEnd(Action::Return),
                ..
            }
        ));
    }

    #[test]
    fn test_renew_to_requested_end() {
        let active = registered(Some(at(2024, 1, 1)));
        let t = applied(
            machine(5)
                .renew(&active, dev("A"), name(), Some(at(2023, 12, 15)), at(2023, 12, 1))
                .unwrap(),
        );
        assert_eq!(t.next.status, StatusKind::Active);
        assert_eq!(t.next.current_end, Some(at(2023, 12, 15)));
        let notify = t.notify.unwrap();
        assert_eq!(notify.license_id.as_str(), "L1");
        assert_eq!(notify.rights_end, Some(at(2023, 12, 15)));
        assert_eq!(t.next.potential_end, active.potential_end);
    }

    #[test]
    fn test_renew_beyond_potential_end_is_rejected() {
        let active = registered(Some(at(2024, 1, 1)));
        let err = machine(5)
            .renew(&active, dev("A"), name(), Some(at(2025, 1, 1)), at(2023, 12, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                reason: PolicyViolation::BeyondPotentialEnd { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_renew_after_lapse_reports_expired() {
        let active = registered(Some(at(2023, 11, 30)));
        let err = machine(5)
            .renew(&active, dev("A"), name(), None, at(2023, 12, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                status: StatusKind::Expired,
                ..
            }
        ));
    }

    // ─── Operator ────────────────────────────────────────────────────

    #[test]
    fn test_cancel_ready_license() {
        let t = applied(machine(5).cancel(&issued(Some(at(2024, 1, 1))), at(2023, 12, 1)).unwrap());
        assert_eq!(t.next.status, StatusKind::Cancelled);
        assert_eq!(t.event.event_type, EventType::Cancel);
        assert!(t.event.device_id.is_none());
        assert_eq!(t.notify.unwrap().rights_end, Some(at(2023, 12, 1)));
    }

    #[test]
    fn test_cancel_active_is_invalid() {
        let err = machine(5)
            .cancel(&registered(None), at(2023, 12, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                action: Action::Cancel,
                ..
            }
        ));
    }

    #[test]
    fn test_revoke_active_license() {
        let t = applied(machine(5).revoke(&registered(None), at(2023, 12, 1)).unwrap());
        assert_eq!(t.from, StatusKind::Active);
        assert_eq!(t.next.status, StatusKind::Revoked);
        assert_eq!(t.event.event_type, EventType::Revoke);
    }

    #[test]
    fn test_revoke_twice_is_invalid() {
        let revoked = applied(machine(5).revoke(&registered(None), at(2023, 12, 1)).unwrap()).next;
        assert!(machine(5).revoke(&revoked, at(2023, 12, 2)).is_err());
    }

    // ─── Expiry ──────────────────────────────────────────────────────

    #[test]
    fn test_expire_only_lapsed_records() {
        let m = machine(5);
        let active = registered(Some(at(2024, 1, 1)));
        assert!(m.expire(&active, at(2023, 12, 1)).is_none());
        let corrected = m.expire(&active, at(2024, 1, 2)).unwrap();
        assert_eq!(corrected.status, StatusKind::Expired);
        assert_eq!(corrected.current_end, active.current_end);
        assert!(m.expire(&corrected, at(2024, 1, 3)).is_none());
    }

    proptest! {
        #[test]
        fn test_renew_never_moves_end_past_potential(
            end_days in 1i64..90,
            requested_days in 1i64..200,
            now_days in 2i64..30,
        ) {
            let base = at(2023, 11, 20);
            let active = registered(Some(base + chrono::Duration::days(end_days)));
            let now = base + chrono::Duration::days(now_days);
            let requested = base + chrono::Duration::days(requested_days);
            match machine(5).renew(&active, dev("A"), name(), Some(requested), now) {
                Ok(TransitionOutcome::Applied(t)) => {
                    prop_assert!(t.next.current_end <= active.potential_end);
                    prop_assert_eq!(t.notify.unwrap().rights_end, t.next.current_end);
                }
                Ok(TransitionOutcome::Unchanged) => prop_assert!(false, "renew is never a no-op"),
                Err(_) => {}
            }
        }

        #[test]
        fn test_stored_status_is_always_known(ops in proptest::collection::vec(0u8..6, 0..12)) {
            let m = machine(2);
            let mut status = issued(Some(at(2024, 1, 1)));
            let mut now = at(2023, 11, 21);
            for op in ops {
                now += chrono::Duration::days(3);
                let outcome = match op {
                    0 => m.register(&status, dev("A"), name(), now),
                    1 => m.register(&status, dev("B"), name(), now),
                    2 => m.return_license(&status, dev("A"), name(), now),
                    3 => m.renew(&status, dev("A"), name(), None, now),
                    4 => m.cancel(&status, now),
                    _ => m.revoke(&status, now),
                };
                if let Ok(TransitionOutcome::Applied(t)) = outcome {
                    status = t.next;
                }
                if let Some(expired) = m.expire(&status, now) {
                    status = expired;
                }
                prop_assert!(StatusKind::ALL.contains(&status.status));
                prop_assert!(status.device_count() <= 2);
            }
        }
    }
}
