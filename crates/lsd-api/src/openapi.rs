//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "License Status API",
        version = "0.1.0",
        description = "License status documents, device register/return/renew, operator revoke/cancel, and issuer synchronization.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Status documents
        crate::routes::status::get_status,
        // Device actions
        crate::routes::devices::register_device,
        crate::routes::devices::return_license,
        crate::routes::devices::renew_license,
        // Operator
        crate::routes::licenses::issue_license,
        crate::routes::licenses::list_licenses,
        crate::routes::licenses::change_status,
        crate::routes::licenses::registered_devices,
        // Admin
        crate::routes::admin::resync,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::licenses::IssueLicenseRequest,
        crate::routes::licenses::RightsRequest,
        crate::routes::licenses::StatusChangeRequest,
        crate::routes::licenses::RegisteredDevice,
        crate::routes::licenses::RegisteredDevicesResponse,
        crate::routes::licenses::LicenseSummary,
        crate::routes::admin::ResyncResponse,
    )),
    tags(
        (name = "status", description = "License status documents"),
        (name = "devices", description = "Device register, return, and renew"),
        (name = "licenses", description = "Operator license management"),
        (name = "admin", description = "Administrative resynchronization"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
