//! # API Route Modules
//!
//! - `status`: status document read (public).
//! - `devices`: device register / return / renew (public).
//! - `licenses`: status creation, operator revoke/cancel, registered
//!   devices, filtered listing (operator auth).
//! - `admin`: full resynchronization (operator auth).

pub mod admin;
pub mod devices;
pub mod licenses;
pub mod status;

use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;

use lsd_state::{EventLog, LicenseStatus, CONTENT_TYPE_STATUS};

use crate::state::AppState;

/// Render the status document of `status` for the caller's language.
pub(crate) fn render_document(
    state: &AppState,
    status: &LicenseStatus,
    events: &EventLog,
    headers: &HeaderMap,
) -> Response {
    let accept_language = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());
    let document = state.assembler.assemble(
        status,
        events,
        state.localizer.as_ref(),
        accept_language,
        state.engine.now(),
    );
    ([(header::CONTENT_TYPE, CONTENT_TYPE_STATUS)], Json(document)).into_response()
}

/// Render the document of a status a write just returned.
///
/// The write already happened, so a failed history read degrades to an
/// empty event list instead of an error.
pub(crate) async fn render_committed(
    state: &AppState,
    status: &LicenseStatus,
    headers: &HeaderMap,
) -> Response {
    let events = match state.engine.history(status).await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(license_id = %status.license_ref, error = %e, "event history unavailable after write");
            EventLog::empty()
        }
    };
    render_document(state, status, &events, headers)
}
