//! # Device Actions API
//!
//! | Method | Path | Action |
//! |--------|------|--------|
//! | POST | `/licenses/{license_id}/register?id&name` | register a device |
//! | POST | `/licenses/{license_id}/return?id&name` | return the loan |
//! | POST | `/licenses/{license_id}/renew?end&id&name` | extend the loan |
//!
//! Each answers with the updated status document. These query parameters
//! are the ones advertised by the templated links of the status document.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use lsd_core::{DeviceId, DeviceName, LicenseId};

use crate::error::{AppError, ErrorBody};
use crate::extractors::extract_query;
use crate::routes::render_committed;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Device identification carried in the query string.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeviceParams {
    /// Device identifier. Required.
    pub id: Option<String>,
    /// Human-readable device name.
    pub name: Option<String>,
    /// Requested rights end, RFC 3339 (renew only).
    pub end: Option<String>,
}

impl DeviceParams {
    fn device(&self) -> Result<(DeviceId, DeviceName), AppError> {
        let id = self
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing device id".into()))?;
        let name = DeviceName::new(self.name.clone().unwrap_or_default())?;
        Ok((DeviceId::new(id)?, name))
    }

    fn end(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .end
            .as_deref()
            .filter(|end| !end.is_empty())
            .map(lsd_core::parse_timestamp)
            .transpose()?)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the device actions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/licenses/{license_id}/register", post(register_device))
        .route("/licenses/{license_id}/return", post(return_license))
        .route("/licenses/{license_id}/renew", post(renew_license))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /licenses/{license_id}/register: Register a device.
///
/// Registering an already registered device succeeds without a new event.
#[utoipa::path(
    post,
    path = "/licenses/{license_id}/register",
    params(
        ("license_id" = String, Path, description = "License identifier"),
        DeviceParams,
    ),
    responses(
        (status = 200, description = "Updated status document", body = serde_json::Value),
        (status = 400, description = "Missing or malformed device id", body = ErrorBody),
        (status = 403, description = "Registration not allowed or device limit reached", body = ErrorBody),
        (status = 404, description = "Unknown license", body = ErrorBody),
        (status = 409, description = "Concurrent update, retry", body = ErrorBody),
    ),
    tag = "devices"
)]
pub async fn register_device(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
    headers: HeaderMap,
    params: Result<Query<DeviceParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let license_id = LicenseId::new(license_id)?;
    let (device, name) = extract_query(params)?.device()?;
    let status = state.engine.register(&license_id, device, name).await?;
    Ok(render_committed(&state, &status, &headers).await)
}

/// POST /licenses/{license_id}/return: Return the license from a device.
#[utoipa::path(
    post,
    path = "/licenses/{license_id}/return",
    params(
        ("license_id" = String, Path, description = "License identifier"),
        DeviceParams,
    ),
    responses(
        (status = 200, description = "Updated status document", body = serde_json::Value),
        (status = 400, description = "Missing or malformed device id", body = ErrorBody),
        (status = 403, description = "Return not allowed", body = ErrorBody),
        (status = 404, description = "Unknown license", body = ErrorBody),
        (status = 500, description = "Issuer update failed", body = ErrorBody),
    ),
    tag = "devices"
)]
pub async fn return_license(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
    headers: HeaderMap,
    params: Result<Query<DeviceParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let license_id = LicenseId::new(license_id)?;
    let (device, name) = extract_query(params)?.device()?;
    let status = state.engine.return_license(&license_id, device, name).await?;
    Ok(render_committed(&state, &status, &headers).await)
}

/// POST /licenses/{license_id}/renew: Extend the rights end.
///
/// Without `end`, the current end is extended by the configured default.
#[utoipa::path(
    post,
    path = "/licenses/{license_id}/renew",
    params(
        ("license_id" = String, Path, description = "License identifier"),
        DeviceParams,
    ),
    responses(
        (status = 200, description = "Updated status document", body = serde_json::Value),
        (status = 400, description = "Missing device id or malformed end date", body = ErrorBody),
        (status = 403, description = "Renewal not allowed or beyond the potential end", body = ErrorBody),
        (status = 404, description = "Unknown license", body = ErrorBody),
        (status = 500, description = "Issuer update failed", body = ErrorBody),
    ),
    tag = "devices"
)]
pub async fn renew_license(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
    headers: HeaderMap,
    params: Result<Query<DeviceParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let license_id = LicenseId::new(license_id)?;
    let params = extract_query(params)?;
    let (device, name) = params.device()?;
    let end = params.end()?;
    let status = state.engine.renew(&license_id, device, name, end).await?;
    Ok(render_committed(&state, &status, &headers).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_empty_device_id_is_bad_request() {
        assert!(matches!(
            DeviceParams::default().device(),
            Err(AppError::BadRequest(_))
        ));
        let params = DeviceParams {
            id: Some(String::new()),
            ..DeviceParams::default()
        };
        assert!(matches!(params.device(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn name_defaults_to_empty() {
        let params = DeviceParams {
            id: Some("dev-1".into()),
            ..DeviceParams::default()
        };
        let (id, name) = params.device().unwrap();
        assert_eq!(id.as_str(), "dev-1");
        assert_eq!(name.as_str(), "");
    }

    #[test]
    fn end_must_be_rfc3339() {
        let params = DeviceParams {
            end: Some("next tuesday".into()),
            ..DeviceParams::default()
        };
        assert!(matches!(params.end(), Err(AppError::BadRequest(_))));

        let params = DeviceParams {
            end: Some("2023-12-15T00:00:00Z".into()),
            ..DeviceParams::default()
        };
        assert!(params.end().unwrap().is_some());
    }
}
