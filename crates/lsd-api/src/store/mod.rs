//! # Status Persistence
//!
//! The [`StatusStore`] trait is the persistence boundary of the transition
//! saga. Two implementations:
//!
//! - [`MemoryStore`]: process-local, used when no `database_url` is
//!   configured and in tests.
//! - [`PgStore`]: PostgreSQL via SQLx, selected when `database_url` is set.
//!
//! ## Concurrency contract
//!
//! Every write of a [`LicenseStatus`] is checked against the `version` it
//! was read at. A stale write fails with [`StoreError::Conflict`] and changes
//! nothing. [`StatusStore::commit_transition`] writes the status and its
//! event as one unit: both land or neither does.
//!
//! ## Bulk loading
//!
//! [`StatusStore::bulk_load`] and [`StatusStore::replace_all`] only insert.
//! A batch repeating an `id` or a `license_ref`, internally or against a
//! stored row, fails with [`StoreError::Duplicate`] and writes nothing.

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashSet;

use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

use lsd_core::LicenseId;
use lsd_state::{EventLog, LicenseStatus, NewEvent, TransactionEvent};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Boxed future returned by [`StatusStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No status exists for the license.
    #[error("no status for license {0}")]
    NotFound(String),

    /// The record changed since it was read.
    #[error("status of license {license_id} changed concurrently (expected version {expected_version})")]
    Conflict {
        license_id: String,
        expected_version: i64,
    },

    /// A loaded batch repeats a status id or license.
    #[error("duplicate status in dataset: {0}")]
    Duplicate(String),

    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Selection criteria for [`StatusStore::list_statuses`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    /// Only statuses with at least this many registered devices.
    pub min_devices: u32,
    /// Rows to skip.
    pub offset: u32,
    /// Maximum rows to return.
    pub limit: u32,
}

/// Persistent store for license statuses and their event history.
pub trait StatusStore: Send + Sync + std::fmt::Debug {
    /// The status tracking `license_id`.
    fn get_status<'a>(&'a self, license_id: &'a LicenseId) -> StoreFuture<'a, LicenseStatus>;

    /// Insert `status` unless one already tracks the same license.
    ///
    /// Returns the stored record and whether it was created by this call.
    fn create_status(&self, status: LicenseStatus) -> StoreFuture<'_, (LicenseStatus, bool)>;

    /// Overwrite a status read at `status.version`.
    ///
    /// Returns the stored record with its version bumped.
    fn save_status(&self, status: LicenseStatus) -> StoreFuture<'_, LicenseStatus>;

    /// Append an event to the history of status `license_status_id`.
    fn append_event(
        &self,
        license_status_id: Uuid,
        event: NewEvent,
    ) -> StoreFuture<'_, TransactionEvent>;

    /// Save `next` and append `event` atomically, with the same version check
    /// as [`save_status`](Self::save_status).
    fn commit_transition(
        &self,
        next: LicenseStatus,
        event: NewEvent,
    ) -> StoreFuture<'_, (LicenseStatus, TransactionEvent)>;

    /// The ordered history of status `license_status_id`. Empty when none.
    fn list_events(&self, license_status_id: Uuid) -> StoreFuture<'_, EventLog>;

    /// Statuses matching `filter`, ordered by license id.
    fn list_statuses<'a>(&'a self, filter: &'a StatusFilter) -> StoreFuture<'a, Vec<LicenseStatus>>;

    /// Delete every status and event. Returns the number of statuses removed.
    fn purge_all(&self) -> StoreFuture<'_, u64>;

    /// Insert `statuses` as given, all or nothing.
    ///
    /// Returns `statuses.len()`. Duplicates fail as described in the
    /// module docs.
    fn bulk_load(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, usize>;

    /// [`purge_all`](Self::purge_all) then [`bulk_load`](Self::bulk_load) as
    /// one unit. On any failure the previous dataset is kept.
    ///
    /// Returns the number of statuses removed and loaded.
    fn replace_all(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, (u64, usize)>;
}

/// Reject a batch that repeats an `id` or a `license_ref`.
pub(crate) fn check_unique(statuses: &[LicenseStatus]) -> Result<(), StoreError> {
    let mut ids = HashSet::new();
    let mut refs = HashSet::new();
    for status in statuses {
        if !ids.insert(status.id) {
            return Err(StoreError::Duplicate(format!("status id {}", status.id)));
        }
        if !refs.insert(&status.license_ref) {
            return Err(StoreError::Duplicate(format!("license {}", status.license_ref)));
        }
    }
    Ok(())
}
