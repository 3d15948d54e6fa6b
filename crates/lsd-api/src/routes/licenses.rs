//! # Operator License API
//!
//! Endpoints used by the issuing server and operators. All sit behind
//! operator Basic auth.
//!
//! - `PUT   /licenses`: start tracking a newly issued license
//! - `GET   /licenses?devices&page&per_page`: list statuses
//! - `PATCH /licenses/{license_id}/status`: revoke or cancel
//! - `GET   /licenses/{license_id}/registered`: registered devices

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use lsd_core::LicenseId;
use lsd_state::{LicenseStatus, StatusKind};

use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::routes::render_committed;
use crate::state::AppState;
use crate::store::StatusFilter;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Rights window of a newly issued license.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RightsRequest {
    /// Start of the rights window.
    pub start: Option<DateTime<Utc>>,
    /// End of the rights window. Absent for unlimited licenses.
    pub end: Option<DateTime<Utc>>,
}

/// A license the issuing server just created.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueLicenseRequest {
    /// License identifier.
    pub id: String,
    /// Last modification of the license on the issuer.
    pub updated: Option<DateTime<Utc>>,
    /// Rights window.
    #[serde(default)]
    pub rights: RightsRequest,
}

impl Validate for IssueLicenseRequest {
    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("license id must not be empty".into());
        }
        if let (Some(start), Some(end)) = (self.rights.start, self.rights.end) {
            if end < start {
                return Err("rights end precedes rights start".into());
            }
        }
        Ok(())
    }
}

/// Operator status change.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChangeRequest {
    /// Target status: `revoked` or `cancelled`.
    #[schema(value_type = String, example = "revoked")]
    pub status: StatusKind,
}

impl Validate for StatusChangeRequest {
    fn validate(&self) -> Result<(), String> {
        match self.status {
            StatusKind::Revoked | StatusKind::Cancelled => Ok(()),
            other => Err(format!(
                "operators may only set status to revoked or cancelled, not {other}"
            )),
        }
    }
}

/// A device registered against a license.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisteredDevice {
    /// Device identifier.
    pub id: String,
    /// Device name.
    pub name: String,
    /// First registration.
    pub timestamp: DateTime<Utc>,
}

/// Devices registered against a license.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisteredDevicesResponse {
    /// License identifier.
    pub id: String,
    /// Registered devices, ordered by device id.
    pub devices: Vec<RegisteredDevice>,
}

/// One entry of the status listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LicenseSummary {
    /// License identifier.
    pub id: String,
    /// Effective status.
    pub status: String,
    /// Registered devices.
    pub device_count: usize,
    /// Current rights end.
    pub end: Option<DateTime<Utc>>,
    /// Renewal ceiling.
    pub potential_end: Option<DateTime<Utc>>,
    /// Last status change.
    pub updated: DateTime<Utc>,
}

impl LicenseSummary {
    fn from_status(status: &LicenseStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: status.license_ref.to_string(),
            status: status.effective_status(now).to_string(),
            device_count: status.device_count(),
            end: status.current_end,
            potential_end: status.potential_end,
            updated: status.status_updated,
        }
    }
}

/// Listing filter and pagination.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Minimum number of registered devices.
    pub devices: Option<u32>,
    /// Page number, starting at 1. Default 1.
    pub page: Option<u32>,
    /// Page size. Default 30, capped at 200.
    pub per_page: Option<u32>,
}

impl ListParams {
    const DEFAULT_PER_PAGE: u32 = 30;
    const MAX_PER_PAGE: u32 = 200;

    /// Page size after defaults and capping.
    pub fn effective_limit(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .min(Self::MAX_PER_PAGE)
    }

    /// Rows skipped before the requested page.
    pub fn effective_offset(&self) -> u32 {
        (self.page.unwrap_or(1).max(1) - 1).saturating_mul(self.effective_limit())
    }

    fn filter(&self) -> Result<StatusFilter, AppError> {
        if self.page == Some(0) {
            return Err(AppError::BadRequest("page starts at 1".into()));
        }
        if self.per_page == Some(0) {
            return Err(AppError::BadRequest("per_page must be at least 1".into()));
        }
        Ok(StatusFilter {
            min_devices: self.devices.unwrap_or(0),
            offset: self.effective_offset(),
            limit: self.effective_limit(),
        })
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the operator license router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/licenses", put(issue_license).get(list_licenses))
        .route("/licenses/{license_id}/status", patch(change_status))
        .route("/licenses/{license_id}/registered", get(registered_devices))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// PUT /licenses: Start tracking a newly issued license.
///
/// Answers 201 with the new status document, or 200 with the existing one
/// when the license is already tracked.
#[utoipa::path(
    put,
    path = "/licenses",
    request_body = IssueLicenseRequest,
    responses(
        (status = 201, description = "Status created", body = serde_json::Value),
        (status = 200, description = "Status already existed", body = serde_json::Value),
        (status = 400, description = "Malformed license", body = ErrorBody),
        (status = 401, description = "Operator credentials required", body = ErrorBody),
    ),
    tag = "licenses"
)]
pub async fn issue_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<IssueLicenseRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = extract_validated_json(body)?;
    let license_id = LicenseId::new(req.id)?;
    let (status, created) = state
        .engine
        .issue(
            license_id,
            req.rights.start,
            req.rights.end,
            req.updated,
        )
        .await?;
    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, render_committed(&state, &status, &headers).await).into_response())
}

/// GET /licenses: List license statuses.
#[utoipa::path(
    get,
    path = "/licenses",
    params(ListParams),
    responses(
        (status = 200, description = "Matching statuses", body = Vec<LicenseSummary>),
        (status = 400, description = "Invalid pagination", body = ErrorBody),
        (status = 401, description = "Operator credentials required", body = ErrorBody),
    ),
    tag = "licenses"
)]
pub async fn list_licenses(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<LicenseSummary>>, AppError> {
    let filter = extract_query(params)?.filter()?;
    let now = state.engine.now();
    let statuses = state.engine.list(&filter).await?;
    Ok(Json(
        statuses
            .iter()
            .map(|s| LicenseSummary::from_status(s, now))
            .collect(),
    ))
}

/// PATCH /licenses/{license_id}/status: Revoke or cancel a license.
#[utoipa::path(
    patch,
    path = "/licenses/{license_id}/status",
    params(("license_id" = String, Path, description = "License identifier")),
    request_body = StatusChangeRequest,
    responses(
        (status = 200, description = "Updated status document", body = serde_json::Value),
        (status = 400, description = "Unsupported target status", body = ErrorBody),
        (status = 401, description = "Operator credentials required", body = ErrorBody),
        (status = 403, description = "Transition not allowed", body = ErrorBody),
        (status = 404, description = "Unknown license", body = ErrorBody),
        (status = 500, description = "Issuer update failed", body = ErrorBody),
    ),
    tag = "licenses"
)]
pub async fn change_status(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let license_id = LicenseId::new(license_id)?;
    let req = extract_validated_json(body)?;
    let status = match req.status {
        StatusKind::Cancelled => state.engine.cancel(&license_id).await?,
        _ => state.engine.revoke(&license_id).await?,
    };
    Ok(render_committed(&state, &status, &headers).await)
}

/// GET /licenses/{license_id}/registered: Devices registered against a license.
#[utoipa::path(
    get,
    path = "/licenses/{license_id}/registered",
    params(("license_id" = String, Path, description = "License identifier")),
    responses(
        (status = 200, description = "Registered devices", body = RegisteredDevicesResponse),
        (status = 401, description = "Operator credentials required", body = ErrorBody),
        (status = 404, description = "Unknown license", body = ErrorBody),
    ),
    tag = "licenses"
)]
pub async fn registered_devices(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
) -> Result<Json<RegisteredDevicesResponse>, AppError> {
    let license_id = LicenseId::new(license_id)?;
    let status = state.engine.get(&license_id).await?;
    Ok(Json(RegisteredDevicesResponse {
        id: status.license_ref.to_string(),
        devices: status
            .devices
            .iter()
            .map(|(id, record)| RegisteredDevice {
                id: id.to_string(),
                name: record.name.to_string(),
                timestamp: record.registered_at,
            })
            .collect(),
    }))
}
