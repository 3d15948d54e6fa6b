//! # Status Document API
//!
//! - `GET /licenses/{license_id}/status`: current status document.
//!
//! Lapsed licenses are reported as `expired` here without touching the
//! store; the correction is persisted by the next write.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use lsd_core::LicenseId;

use crate::error::{AppError, ErrorBody};
use crate::routes::render_document;
use crate::state::AppState;

/// Build the status document router.
pub fn router() -> Router<AppState> {
    Router::new().route("/licenses/{license_id}/status", get(get_status))
}

/// GET /licenses/{license_id}/status: Render the license status document.
#[utoipa::path(
    get,
    path = "/licenses/{license_id}/status",
    params(
        ("license_id" = String, Path, description = "License identifier"),
        ("Accept-Language" = Option<String>, Header, description = "Preferred message languages"),
    ),
    responses(
        (status = 200, description = "Status document", body = serde_json::Value,
            content_type = "application/vnd.readium.license.status.v1.0+json"),
        (status = 400, description = "Malformed license id", body = ErrorBody),
        (status = 404, description = "Unknown license", body = ErrorBody),
    ),
    tag = "status"
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let license_id = LicenseId::new(license_id)?;
    let (status, events) = state.engine.load(&license_id).await?;
    Ok(render_document(&state, &status, &events, &headers))
}
