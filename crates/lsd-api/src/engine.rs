//! # Transition Saga
//!
//! [`LicenseEngine`] runs every state-changing action against a license
//! status as one unit:
//!
//! 1. Load the status. If it has lapsed, persist `expired` first (no event).
//! 2. Ask the [`StatusStateMachine`] for the transition.
//! 3. If the rights end moves, notify the issuer and wait for `200 OK`.
//! 4. Commit the next status and its event, version-checked.
//!
//! Nothing is written before the issuer accepts. A commit failing after
//! the issuer accepted leaves the two systems disagreeing; it is reported
//! as [`EngineError::FatalInconsistency`] and never repaired automatically.
//!
//! Dropping the returned future (client disconnect) abandons the issuer
//! call and commits nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use lsd_core::{Clock, DeviceId, DeviceName, LicenseId};
use lsd_issuer_client::{IssuerError, IssuerNotifier};
use lsd_state::{
    Action, EventLog, LicenseStatus, Policy, StatusStateMachine, Transition, TransitionError,
    TransitionOutcome,
};

use crate::store::{StatusFilter, StatusStore, StoreError};

/// Why an engine operation failed.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The action is not allowed now.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The store refused or failed; nothing was notified.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The issuer did not answer. Nothing was written.
    #[error("issuer unreachable: {0}")]
    IssuerUnreachable(#[source] IssuerError),

    /// The issuer refused the update. Nothing was written.
    #[error("issuer rejected update: {0}")]
    IssuerRejected(#[source] IssuerError),

    /// The issuer accepted a new end date that could not be stored.
    #[error("issuer holds end {notified:?} for license {license_id} but the store kept {stored:?}: {source}")]
    FatalInconsistency {
        license_id: String,
        notified: Option<DateTime<Utc>>,
        stored: Option<DateTime<Utc>>,
        #[source]
        source: StoreError,
    },
}

/// Outcome of a full resynchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncReport {
    /// Statuses deleted.
    pub purged: u64,
    /// Statuses inserted.
    pub loaded: usize,
}

/// Orchestrates transitions between the state machine, the issuer, and the store.
#[derive(Debug, Clone)]
pub struct LicenseEngine {
    store: Arc<dyn StatusStore>,
    notifier: Arc<dyn IssuerNotifier>,
    clock: Arc<dyn Clock>,
    machine: StatusStateMachine,
}

impl LicenseEngine {
    pub fn new(
        store: Arc<dyn StatusStore>,
        notifier: Arc<dyn IssuerNotifier>,
        clock: Arc<dyn Clock>,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            machine: StatusStateMachine::new(policy),
        }
    }

    /// Current time from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn policy(&self) -> &Policy {
        self.machine.policy()
    }

    /// Track a newly issued license as `ready`.
    ///
    /// Returns the stored status and whether this call created it. An
    /// existing status is returned untouched.
    pub async fn issue(
        &self,
        license_id: LicenseId,
        rights_start: Option<DateTime<Utc>>,
        rights_end: Option<DateTime<Utc>>,
        license_updated: Option<DateTime<Utc>>,
    ) -> Result<(LicenseStatus, bool), EngineError> {
        let now = self.now();
        let status = LicenseStatus::issued(
            license_id,
            rights_start,
            rights_end,
            license_updated.unwrap_or(now),
            now,
            self.policy(),
        );
        let (stored, created) = self.store.create_status(status).await?;
        if created {
            tracing::info!(license_id = %stored.license_ref, end = ?stored.current_end, "license status created");
        }
        Ok((stored, created))
    }

    /// The stored status of `license_id` with its event history.
    pub async fn load(&self, license_id: &LicenseId) -> Result<(LicenseStatus, EventLog), EngineError> {
        let status = self.store.get_status(license_id).await?;
        let events = self.store.list_events(status.id).await?;
        Ok((status, events))
    }

    /// The event history of an already loaded `status`.
    pub async fn history(&self, status: &LicenseStatus) -> Result<EventLog, EngineError> {
        Ok(self.store.list_events(status.id).await?)
    }

    /// The stored status of `license_id`.
    pub async fn get(&self, license_id: &LicenseId) -> Result<LicenseStatus, EngineError> {
        Ok(self.store.get_status(license_id).await?)
    }

    /// Statuses matching `filter`.
    pub async fn list(&self, filter: &StatusFilter) -> Result<Vec<LicenseStatus>, EngineError> {
        Ok(self.store.list_statuses(filter).await?)
    }

    pub async fn register(
        &self,
        license_id: &LicenseId,
        device: DeviceId,
        name: DeviceName,
    ) -> Result<LicenseStatus, EngineError> {
        self.apply(license_id, Action::Register, move |m, current, now| {
            m.register(current, device, name, now)
        })
        .await
    }

    pub async fn return_license(
        &self,
        license_id: &LicenseId,
        device: DeviceId,
        name: DeviceName,
    ) -> Result<LicenseStatus, EngineError> {
        self.apply(license_id, Action::Return, move |m, current, now| {
            m.return_license(current, device, name, now)
        })
        .await
    }

    /// Renew to `end`, or by the configured default span when `None`.
    pub async fn renew(
        &self,
        license_id: &LicenseId,
        device: DeviceId,
        name: DeviceName,
        end: Option<DateTime<Utc>>,
    ) -> Result<LicenseStatus, EngineError> {
        self.apply(license_id, Action::Renew, move |m, current, now| {
            m.renew(current, device, name, end, now)
        })
        .await
    }

    pub async fn revoke(&self, license_id: &LicenseId) -> Result<LicenseStatus, EngineError> {
        self.apply(license_id, Action::Revoke, |m, current, now| {
            m.revoke(current, now)
        })
        .await
    }

    pub async fn cancel(&self, license_id: &LicenseId) -> Result<LicenseStatus, EngineError> {
        self.apply(license_id, Action::Cancel, |m, current, now| {
            m.cancel(current, now)
        })
        .await
    }

    /// Replace the whole dataset with `statuses`.
    pub async fn resync(&self, statuses: Vec<LicenseStatus>) -> Result<ResyncReport, EngineError> {
        let (purged, loaded) = self.store.replace_all(statuses).await?;
        tracing::warn!(purged, loaded, "license statuses resynchronized");
        Ok(ResyncReport { purged, loaded })
    }

    async fn apply<F>(
        &self,
        license_id: &LicenseId,
        action: Action,
        compute: F,
    ) -> Result<LicenseStatus, EngineError>
    where
        F: FnOnce(
                &StatusStateMachine,
                &LicenseStatus,
                DateTime<Utc>,
            ) -> Result<TransitionOutcome, TransitionError>
            + Send,
    {
        let now = self.now();
        let mut current = self.store.get_status(license_id).await?;

        if let Some(expired) = self.machine.expire(&current, now) {
            current = self.store.save_status(expired).await.map_err(|e| {
                if matches!(e, StoreError::Conflict { .. }) {
                    tracing::warn!(license_id = %license_id, action = %action, "concurrent write while persisting expiry");
                }
                e
            })?;
            tracing::info!(license_id = %license_id, "lapsed license stored as expired");
        }

        let Transition {
            action,
            from,
            next,
            event,
            notify,
        } = match compute(&self.machine, &current, now) {
            Ok(TransitionOutcome::Applied(transition)) => *transition,
            Ok(TransitionOutcome::Unchanged) => {
                tracing::debug!(license_id = %license_id, action = %action, "transition is a no-op");
                return Ok(current);
            }
            Err(e) => {
                tracing::info!(license_id = %license_id, action = %action, status = %current.status, reason = %e, "transition refused");
                return Err(e.into());
            }
        };

        if let Some(update) = &notify {
            match self.notifier.notify(&update.license_id, update.rights_end).await {
                Ok(ack) => {
                    tracing::debug!(license_id = %license_id, http_status = ack.status, "issuer accepted update");
                }
                Err(e) if e.is_network() => {
                    tracing::warn!(license_id = %license_id, action = %action, error = %e, "issuer unreachable, transition abandoned");
                    return Err(EngineError::IssuerUnreachable(e));
                }
                Err(e) => {
                    tracing::error!(
                        license_id = %license_id,
                        action = %action,
                        http_status = ?e.status(),
                        error = %e,
                        "issuer rejected update, transition abandoned"
                    );
                    return Err(EngineError::IssuerRejected(e));
                }
            }
        }

        let to = next.status;
        match self.store.commit_transition(next, event).await {
            Ok((saved, _)) => {
                tracing::info!(license_id = %license_id, action = %action, from = %from, to = %to, end = ?saved.current_end, "transition applied");
                Ok(saved)
            }
            Err(source) => match notify {
                Some(update) => {
                    tracing::error!(
                        fatal_inconsistency = true,
                        license_id = %license_id,
                        action = %action,
                        notified_end = ?update.rights_end,
                        stored_end = ?current.current_end,
                        error = %source,
                        "issuer updated but status could not be stored"
                    );
                    Err(EngineError::FatalInconsistency {
                        license_id: license_id.to_string(),
                        notified: update.rights_end,
                        stored: current.current_end,
                        source,
                    })
                }
                None => {
                    if matches!(source, StoreError::Conflict { .. }) {
                        tracing::warn!(license_id = %license_id, action = %action, "concurrent write, transition abandoned");
                    }
                    Err(EngineError::Store(source))
                }
            },
        }
    }
}
