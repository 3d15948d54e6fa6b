//! # Administrative API
//!
//! - `POST /admin/resync`: replace every tracked status with the posted
//!   dataset in one store operation. Event history is discarded. A failed
//!   load leaves the previous dataset in place.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use lsd_state::LicenseStatus;

use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;
use crate::store::check_unique;

/// The authoritative dataset.
#[derive(Debug, Deserialize)]
pub struct ResyncRequest {
    /// Statuses to load, in full.
    pub statuses: Vec<LicenseStatus>,
}

impl Validate for ResyncRequest {
    fn validate(&self) -> Result<(), String> {
        check_unique(&self.statuses).map_err(|e| e.to_string())
    }
}

/// Result of a resynchronization.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResyncResponse {
    /// Statuses removed.
    pub purged: u64,
    /// Statuses loaded.
    pub loaded: usize,
}

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new().route("/admin/resync", post(resync))
}

/// POST /admin/resync: Replace all statuses.
#[utoipa::path(
    post,
    path = "/admin/resync",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Dataset replaced", body = ResyncResponse),
        (status = 400, description = "Malformed dataset", body = ErrorBody),
        (status = 401, description = "Operator credentials required", body = ErrorBody),
    ),
    tag = "admin"
)]
pub async fn resync(
    State(state): State<AppState>,
    body: Result<Json<ResyncRequest>, JsonRejection>,
) -> Result<Json<ResyncResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let report = state.engine.resync(req.statuses).await?;
    Ok(Json(ResyncResponse {
        purged: report.purged,
        loaded: report.loaded,
    }))
}
