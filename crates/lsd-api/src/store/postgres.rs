//! PostgreSQL [`StatusStore`].
//!
//! All queries run against the `license_status` and `license_event` tables
//! created by the embedded migrations. Optimistic concurrency is enforced in
//! SQL: an update matches only the row at the version it was read at.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use lsd_core::{DeviceId, DeviceName, LicenseId};
use lsd_state::{EventLog, EventType, LicenseStatus, NewEvent, StatusKind, TransactionEvent};

use super::{check_unique, StatusFilter, StatusStore, StoreError, StoreFuture};

const STATUS_COLUMNS: &str = "id, license_ref, status, license_updated, status_updated, \
     current_end, potential_end, devices, version";

/// Connect to `url` and apply the embedded migrations.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Status store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connected pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, migrate, and wrap the pool.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_pool(url).await?))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn devices_json(status: &LicenseStatus) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(&status.devices).map_err(|e| {
        tracing::error!(license_id = %status.license_ref, error = %e, "failed to serialize devices");
        StoreError::Backend(format!("cannot serialize devices: {e}"))
    })
}

const INSERT_STATUS: &str = "INSERT INTO license_status (id, license_ref, status, license_updated,
         status_updated, current_end, potential_end, device_count, devices, version)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

/// Insert `status` unless its license is already tracked. Returns rows inserted.
async fn insert_status(
    tx: &mut Transaction<'_, Postgres>,
    status: &LicenseStatus,
) -> Result<u64, StoreError> {
    let devices = devices_json(status)?;
    let result = sqlx::query(&format!("{INSERT_STATUS} ON CONFLICT (license_ref) DO NOTHING"))
        .bind(status.id)
        .bind(status.license_ref.as_str())
        .bind(status.status.as_str())
        .bind(status.license_updated)
        .bind(status.status_updated)
        .bind(status.current_end)
        .bind(status.potential_end)
        .bind(status.device_count() as i32)
        .bind(&devices)
        .bind(status.version)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Insert every status of a batch. Any unique violation fails the batch.
async fn insert_batch(
    tx: &mut Transaction<'_, Postgres>,
    statuses: &[LicenseStatus],
) -> Result<usize, StoreError> {
    for status in statuses {
        let devices = devices_json(status)?;
        sqlx::query(INSERT_STATUS)
            .bind(status.id)
            .bind(status.license_ref.as_str())
            .bind(status.status.as_str())
            .bind(status.license_updated)
            .bind(status.status_updated)
            .bind(status.current_end)
            .bind(status.potential_end)
            .bind(status.device_count() as i32)
            .bind(&devices)
            .bind(status.version)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if duplicate {
                    StoreError::Duplicate(format!("license {}", status.license_ref))
                } else {
                    e.into()
                }
            })?;
    }
    Ok(statuses.len())
}

async fn delete_all(tx: &mut Transaction<'_, Postgres>) -> Result<u64, StoreError> {
    sqlx::query("DELETE FROM license_event")
        .execute(&mut **tx)
        .await?;
    let removed = sqlx::query("DELETE FROM license_status")
        .execute(&mut **tx)
        .await?
        .rows_affected();
    Ok(removed)
}

async fn update_status(
    tx: &mut Transaction<'_, Postgres>,
    status: LicenseStatus,
) -> Result<LicenseStatus, StoreError> {
    let devices = devices_json(&status)?;
    let result = sqlx::query(
        "UPDATE license_status
         SET status = $1, license_updated = $2, status_updated = $3, current_end = $4,
             potential_end = $5, device_count = $6, devices = $7, version = version + 1
         WHERE id = $8 AND version = $9",
    )
    .bind(status.status.as_str())
    .bind(status.license_updated)
    .bind(status.status_updated)
    .bind(status.current_end)
    .bind(status.potential_end)
    .bind(status.device_count() as i32)
    .bind(&devices)
    .bind(status.id)
    .bind(status.version)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict {
            license_id: status.license_ref.to_string(),
            expected_version: status.version,
        });
    }
    Ok(LicenseStatus {
        version: status.version + 1,
        ..status
    })
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    license_status_id: Uuid,
    event: NewEvent,
) -> Result<TransactionEvent, StoreError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO license_event (license_status_id, event_type, device_id, device_name, timestamp)
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(license_status_id)
    .bind(event.event_type.as_str())
    .bind(event.device_id.as_ref().map(|d| d.as_str()))
    .bind(event.device_name.as_ref().map(|n| n.as_str()))
    .bind(event.timestamp)
    .fetch_one(&mut **tx)
    .await?;
    Ok(event.persisted(id, license_status_id))
}

impl StatusStore for PgStore {
    fn get_status<'a>(&'a self, license_id: &'a LicenseId) -> StoreFuture<'a, LicenseStatus> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, StatusRow>(&format!(
                "SELECT {STATUS_COLUMNS} FROM license_status WHERE license_ref = $1"
            ))
            .bind(license_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.ok_or_else(|| StoreError::NotFound(license_id.to_string()))?
                .into_record()
        })
    }

    fn create_status(&self, status: LicenseStatus) -> StoreFuture<'_, (LicenseStatus, bool)> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let inserted = insert_status(&mut tx, &status).await?;
            tx.commit().await?;
            if inserted > 0 {
                return Ok((status, true));
            }
            let existing = self.get_status(&status.license_ref).await?;
            Ok((existing, false))
        })
    }

    fn save_status(&self, status: LicenseStatus) -> StoreFuture<'_, LicenseStatus> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let saved = update_status(&mut tx, status).await?;
            tx.commit().await?;
            Ok(saved)
        })
    }

    fn append_event(
        &self,
        license_status_id: Uuid,
        event: NewEvent,
    ) -> StoreFuture<'_, TransactionEvent> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let event = insert_event(&mut tx, license_status_id, event).await?;
            tx.commit().await?;
            Ok(event)
        })
    }

    fn commit_transition(
        &self,
        next: LicenseStatus,
        event: NewEvent,
    ) -> StoreFuture<'_, (LicenseStatus, TransactionEvent)> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let saved = update_status(&mut tx, next).await?;
            let event = insert_event(&mut tx, saved.id, event).await?;
            tx.commit().await?;
            Ok((saved, event))
        })
    }

    fn list_events(&self, license_status_id: Uuid) -> StoreFuture<'_, EventLog> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, EventRow>(
                "SELECT id, license_status_id, event_type, device_id, device_name, timestamp
                 FROM license_event WHERE license_status_id = $1
                 ORDER BY timestamp, id",
            )
            .bind(license_status_id)
            .fetch_all(&self.pool)
            .await?;
            let events = rows
                .into_iter()
                .map(EventRow::into_record)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(EventLog::from_events(events))
        })
    }

    fn list_statuses<'a>(&'a self, filter: &'a StatusFilter) -> StoreFuture<'a, Vec<LicenseStatus>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, StatusRow>(&format!(
                "SELECT {STATUS_COLUMNS} FROM license_status
                 WHERE device_count >= $1 ORDER BY license_ref LIMIT $2 OFFSET $3"
            ))
            .bind(filter.min_devices as i32)
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(StatusRow::into_record).collect()
        })
    }

    fn purge_all(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let removed = delete_all(&mut tx).await?;
            tx.commit().await?;
            Ok(removed)
        })
    }

    fn bulk_load(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            check_unique(&statuses)?;
            let mut tx = self.pool.begin().await?;
            let loaded = insert_batch(&mut tx, &statuses).await?;
            tx.commit().await?;
            Ok(loaded)
        })
    }

    fn replace_all(&self, statuses: Vec<LicenseStatus>) -> StoreFuture<'_, (u64, usize)> {
        Box::pin(async move {
            check_unique(&statuses)?;
            let mut tx = self.pool.begin().await?;
            let removed = delete_all(&mut tx).await?;
            let loaded = insert_batch(&mut tx, &statuses).await?;
            tx.commit().await?;
            Ok((removed, loaded))
        })
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct StatusRow {
    id: Uuid,
    license_ref: String,
    status: String,
    license_updated: DateTime<Utc>,
    status_updated: DateTime<Utc>,
    current_end: Option<DateTime<Utc>>,
    potential_end: Option<DateTime<Utc>>,
    devices: serde_json::Value,
    version: i64,
}

impl StatusRow {
    fn into_record(self) -> Result<LicenseStatus, StoreError> {
        let corrupt = |what: &str, err: String| {
            tracing::error!(id = %self.id, license_ref = %self.license_ref, error = %err, "corrupt {what} in license_status row");
            StoreError::Backend(format!("corrupt {what} for status {}: {err}", self.id))
        };
        let license_ref =
            LicenseId::new(self.license_ref.clone()).map_err(|e| corrupt("license_ref", e.to_string()))?;
        let status: StatusKind = self
            .status
            .parse()
            .map_err(|e: lsd_state::UnknownStatus| corrupt("status", e.to_string()))?;
        let devices = serde_json::from_value(self.devices.clone())
            .map_err(|e| corrupt("devices", e.to_string()))?;
        Ok(LicenseStatus {
            id: self.id,
            license_ref,
            status,
            license_updated: self.license_updated,
            status_updated: self.status_updated,
            current_end: self.current_end,
            potential_end: self.potential_end,
            devices,
            version: self.version,
        })
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    license_status_id: Uuid,
    event_type: String,
    device_id: Option<String>,
    device_name: Option<String>,
    timestamp: DateTime<Utc>,
}

impl EventRow {
    fn into_record(self) -> Result<TransactionEvent, StoreError> {
        let corrupt = |err: String| {
            tracing::error!(id = self.id, error = %err, "corrupt license_event row");
            StoreError::Backend(format!("corrupt event {}: {err}", self.id))
        };
        let event_type: EventType = self.event_type.parse().map_err(|e: lsd_state::UnknownEventType| corrupt(e.to_string()))?;
        let device_id = self
            .device_id
            .map(DeviceId::new)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let device_name = self
            .device_name
            .map(DeviceName::new)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        Ok(TransactionEvent {
            id: self.id,
            license_status_id: self.license_status_id,
            event_type,
            device_id,
            device_name,
            timestamp: self.timestamp,
        })
    }
}
