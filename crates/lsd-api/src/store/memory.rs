//! In-memory [`StatusStore`].
//!
//! A single `parking_lot::RwLock` guards statuses and events together, so a
//! committed transition is observed whole or not at all. Guards are never
//! held across an `.await`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use lsd_core::LicenseId;
use lsd_state::{EventLog, LicenseStatus, NewEvent, TransactionEvent};

use super::{check_unique, StatusFilter, StatusStore, StoreError, StoreFuture};

#[derive(Debug, Default)]
struct Inner {
    statuses: HashMap<LicenseId, LicenseStatus>,
    events: HashMap<Uuid, Vec<TransactionEvent>>,
    next_event_id: i64,
}

impl Inner {
    fn save(&mut self, mut status: LicenseStatus) -> Result<LicenseStatus, StoreError> {
        let current = self
            .statuses
            .get_mut(&status.license_ref)
            .ok_or_else(|| StoreError::NotFound(status.license_ref.to_string()))?;
        if current.version != status.version || current.id != status.id {
            return Err(StoreError::Conflict {
                license_id: status.license_ref.to_string(),
                expected_version: status.version,
            });
        }
        status.version += 1;
        *current = status.clone();
        Ok(status)
    }

    fn insert_new(&mut self, statuses: Vec<LicenseStatus>) -> Result<usize, StoreError> {
        check_unique(&statuses)?;
        for status in &statuses {
            if self.statuses.contains_key(&status.license_ref) {
                return Err(StoreError::Duplicate(format!("license {}", status.license_ref)));
            }
            if self.statuses.values().any(|s| s.id == status.id) {
                return Err(StoreError::Duplicate(format!("status id {}", status.id)));
            }
        }
        let count = statuses.len();
        for status in statuses {
            self.statuses.insert(status.license_ref.clone(), status);
        }
        Ok(count)
    }

    fn append(&mut self, license_status_id: Uuid, event: NewEvent) -> TransactionEvent {
        self.next_event_id += 1;
        let event = event.persisted(self.next_event_id, license_status_id);
        self.events
            .entry(license_status_id)
            .or_default()
            .push(event.clone());
        event
    }
}

/// Process-local status store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked statuses.
    pub fn len(&self) -> usize {
        self.inner.read().statuses.len()
    }

    /// Whether the store tracks no status.
    pub fn is_empty(&self) -> bool {
        self.inner.read().statuses.is_empty()
    }
}

impl StatusStore for MemoryStore {
    fn get_status<'a>(&'a self, license_id: &'a LicenseId) -> StoreFuture<'a, LicenseStatus> {
        let result = self
            .inner
            .read()
            .statuses
            .get(license_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(license_id.to_string()));
        Box::pin(async move { result })
    }

    fn create_status(&self, status: LicenseStatus) -> StoreFuture<'_, (LicenseStatus, bool)> {
        let result = match self.inner.write().statuses.entry(status.license_ref.clone()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                slot.insert(status.clone());
                (status, true)
            }
        };
        Box::pin(async move { Ok(result) })
    }

    fn save_status(&self, status: LicenseStatus) -> StoreFuture<'_, LicenseStatus> {
        let result = self.inner.write().save(status);
        Box::pin(async move { result })
    }

    fn append_event(
        &self,
        license_status_id: Uuid,
        event: NewEvent,
    ) -> StoreFuture<'_, TransactionEvent> {
        let event = self.inner.write().append(license_status_id, event);
        Box::pin(async move { Ok(event) })
    }

    fn commit_transition(
        &self,
        next: LicenseStatus,
        event: NewEvent,
    ) -> StoreFuture<'_, (LicenseStatus, TransactionEvent)> {
        let mut inner = self.inner.write();
        let result = inner.save(next).map(|saved| {
            let event = inner.append(saved.id, event);
            (saved, event)
        });
        drop(inner);
        Box::pin(async move { result })
    }

    fn list_events(&self, license_status_id: Uuid) -> StoreFuture<'_, EventLog> {
        let events = self
            .inner
            .read()
            .events
            .get(&license_status_id)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(EventLog::from_events(events)) })
    }

    fn list_statuses<'a>(&'a self, filter: &'a StatusFilter) -> StoreFuture<'a, Vec<LicenseStatus>> {
        let mut matching: Vec<LicenseStatus> = self
            .inner
            .read()
            .statuses
            .values()
            .filter(|s| s.device_count() >= filter.min_devices as usize)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.license_ref.cmp(&b.license_ref));
        let page = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Box::pin(async move { Ok(page) })
    }

    fn purge_all(&self) -> StoreFuture<'_, u64> {
        let mut inner = self.inner.write();
        let removed = inner.statuses.len() as u64;
        inner.statuses.clear();
        inner.events.clear();
        drop(inner);
        Box::pin(async move { Ok(removed) })
    }

    fn bulk_load(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, usize> {
        let result = self.inner.write().insert_new(statuses);
        Box::pin(async move { result })
    }

    fn replace_all(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, (u64, usize)> {
        let result = check_unique(&statuses).map(|()| {
            let mut inner = self.inner.write();
            let removed = inner.statuses.len() as u64;
            inner.statuses.clear();
            inner.events.clear();
            let loaded = statuses.len();
            for status in statuses {
                inner.statuses.insert(status.license_ref.clone(), status);
            }
            (removed, loaded)
        });
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lsd_core::{DeviceId, DeviceName};
    use lsd_state::{EventType, Policy, PolicyConfig, StatusKind};

    fn status(id: &str) -> LicenseStatus {
        let now = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        LicenseStatus::issued(
            LicenseId::new(id).unwrap(),
            None,
            None,
            now,
            now,
            &Policy::new(PolicyConfig::default()),
        )
    }

    fn register_event() -> NewEvent {
        NewEvent::device(
            EventType::Register,
            DeviceId::new("A").unwrap(),
            DeviceName::new("reader").unwrap(),
            Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn create_is_idempotent_per_license() {
        let store = MemoryStore::new();
        let (first, created) = store.create_status(status("L1")).await.unwrap();
        assert!(created);
        let (second, created) = store.create_status(status("L1")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_status_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get_status(&LicenseId::new("nope").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn save_bumps_version_and_rejects_stale_writes() {
        let store = MemoryStore::new();
        let (stored, _) = store.create_status(status("L1")).await.unwrap();

        let mut next = stored.clone();
        next.status = StatusKind::Revoked;
        let saved = store.save_status(next).await.unwrap();
        assert_eq!(saved.version, stored.version + 1);

        let err = store.save_status(stored).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        let current = store.get_status(&saved.license_ref).await.unwrap();
        assert_eq!(current.status, StatusKind::Revoked);
    }

    #[tokio::test]
    async fn failed_commit_appends_no_event() {
        let store = MemoryStore::new();
        let (stored, _) = store.create_status(status("L1")).await.unwrap();
        let mut stale = stored.clone();
        stale.version = 41;
        assert!(store
            .commit_transition(stale, register_event())
            .await
            .is_err());
        assert!(store.list_events(stored.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_writes_status_and_event_together() {
        let store = MemoryStore::new();
        let (stored, _) = store.create_status(status("L1")).await.unwrap();
        let mut next = stored.clone();
        next.status = StatusKind::Active;
        let (saved, event) = store
            .commit_transition(next, register_event())
            .await
            .unwrap();
        assert_eq!(saved.status, StatusKind::Active);
        assert_eq!(event.license_status_id, stored.id);
        let log = store.list_events(stored.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.count_of(EventType::Register), 1);
    }

    #[tokio::test]
    async fn list_filters_by_device_count_and_pages() {
        let store = MemoryStore::new();
        for id in ["L3", "L1", "L2"] {
            store.create_status(status(id)).await.unwrap();
        }
        let (l2, _) = store.create_status(status("L2")).await.unwrap();
        let mut l2 = l2;
        l2.devices.insert(
            DeviceId::new("A").unwrap(),
            lsd_state::DeviceRecord {
                name: DeviceName::new("reader").unwrap(),
                registered_at: l2.status_updated,
                last_seen: l2.status_updated,
            },
        );
        store.save_status(l2).await.unwrap();

        let all = StatusFilter {
            min_devices: 0,
            offset: 0,
            limit: 2,
        };
        let page: Vec<String> = store
            .list_statuses(&all)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.license_ref.to_string())
            .collect();
        assert_eq!(page, vec!["L1", "L2"]);

        let with_devices = StatusFilter {
            min_devices: 1,
            offset: 0,
            limit: 10,
        };
        let found = store.list_statuses(&with_devices).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].license_ref.as_str(), "L2");
    }

    #[tokio::test]
    async fn purge_then_bulk_load_replaces_dataset() {
        let store = MemoryStore::new();
        let (stored, _) = store.create_status(status("L1")).await.unwrap();
        store
            .append_event(stored.id, register_event())
            .await
            .unwrap();

        assert_eq!(store.purge_all().await.unwrap(), 1);
        assert!(store.is_empty());
        assert!(store.list_events(stored.id).await.unwrap().is_empty());

        let loaded = store
            .bulk_load(vec![status("L7"), status("L8")])
            .await
            .unwrap();
        assert_eq!(loaded, 2);
        assert!(store.get_status(&LicenseId::new("L7").unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn bulk_load_rejects_duplicates_and_writes_nothing() {
        let store = MemoryStore::new();
        let (stored, _) = store.create_status(status("L1")).await.unwrap();

        let err = store
            .bulk_load(vec![status("L2"), status("L1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let mut same_id = status("L3");
        same_id.id = stored.id;
        let err = store.bulk_load(vec![same_id]).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let twin = status("L4");
        let mut other = status("L5");
        other.id = twin.id;
        let err = store.bulk_load(vec![twin, other]).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn replace_all_swaps_dataset() {
        let store = MemoryStore::new();
        let (stored, _) = store.create_status(status("L1")).await.unwrap();
        store
            .append_event(stored.id, register_event())
            .await
            .unwrap();

        let (removed, loaded) = store
            .replace_all(vec![status("L7"), status("L8")])
            .await
            .unwrap();
        assert_eq!((removed, loaded), (1, 2));
        assert!(store.get_status(&stored.license_ref).await.is_err());
        assert!(store.list_events(stored.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_dataset() {
        let store = MemoryStore::new();
        let (stored, _) = store.create_status(status("L1")).await.unwrap();
        store
            .append_event(stored.id, register_event())
            .await
            .unwrap();

        let first = status("L7");
        let mut second = status("L8");
        second.id = first.id;
        let err = store.replace_all(vec![first, second]).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        assert_eq!(store.get_status(&stored.license_ref).await.unwrap(), stored);
        assert_eq!(store.list_events(stored.id).await.unwrap().len(), 1);
    }
}
