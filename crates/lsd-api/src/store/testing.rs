//! Test double wrapping [`MemoryStore`] with injectable faults.

use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use lsd_core::LicenseId;
use lsd_state::{EventLog, LicenseStatus, NewEvent, TransactionEvent};

use super::{MemoryStore, StatusFilter, StatusStore, StoreError, StoreFuture};

/// Delegates to a [`MemoryStore`], optionally misbehaving.
#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    pub(crate) inner: MemoryStore,
    /// When set, the next `get_status` is followed by a concurrent save of
    /// the same record, leaving the caller's copy one version behind.
    race_next_read: AtomicBool,
    /// When set, `list_events` fails with a backend error.
    fail_list_events: AtomicBool,
}

impl FaultyStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(crate) fn race_next_read(&self) {
        self.race_next_read.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_list_events(&self) {
        self.fail_list_events.store(true, Ordering::SeqCst);
    }
}

impl StatusStore for FaultyStore {
    fn get_status<'a>(&'a self, license_id: &'a LicenseId) -> StoreFuture<'a, LicenseStatus> {
        Box::pin(async move {
            let read = self.inner.get_status(license_id).await?;
            if self.race_next_read.swap(false, Ordering::SeqCst) {
                self.inner.save_status(read.clone()).await?;
            }
            Ok(read)
        })
    }

    fn create_status(&self, status: LicenseStatus) -> StoreFuture<'_, (LicenseStatus, bool)> {
        self.inner.create_status(status)
    }

    fn save_status(&self, status: LicenseStatus) -> StoreFuture<'_, LicenseStatus> {
        self.inner.save_status(status)
    }

    fn append_event(
        &self,
        license_status_id: Uuid,
        event: NewEvent,
    ) -> StoreFuture<'_, TransactionEvent> {
        self.inner.append_event(license_status_id, event)
    }

    fn commit_transition(
        &self,
        next: LicenseStatus,
        event: NewEvent,
    ) -> StoreFuture<'_, (LicenseStatus, TransactionEvent)> {
        self.inner.commit_transition(next, event)
    }

    fn list_events(&self, license_status_id: Uuid) -> StoreFuture<'_, EventLog> {
        if self.fail_list_events.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StoreError::Backend("event table unavailable".into())) });
        }
        self.inner.list_events(license_status_id)
    }

    fn list_statuses<'a>(&'a self, filter: &'a StatusFilter) -> StoreFuture<'a, Vec<LicenseStatus>> {
        self.inner.list_statuses(filter)
    }

    fn purge_all(&self) -> StoreFuture<'_, u64> {
        self.inner.purge_all()
    }

    fn bulk_load(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, usize> {
        self.inner.bulk_load(statuses)
    }

    fn replace_all(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, (u64, usize)> {
        self.inner.replace_all(statuses)
    }
}
