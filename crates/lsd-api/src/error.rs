//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps transition, store, and issuer failures to HTTP status codes and
//! JSON bodies carrying a machine-readable code. Internal details never
//! reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use lsd_state::TransitionError;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INVALID_TRANSITION").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// `{"retryable": bool}` on 409 and 500 responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid operator credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The action is not allowed from the current status (403).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The device limit is reached (403).
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Unknown license (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent writer won the race (409). Safe to retry.
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    /// The issuer did not answer in time (500). Safe to retry.
    #[error("issuer unreachable: {0}")]
    IssuerUnreachable(String),

    /// The issuer refused the update (500).
    #[error("issuer rejected update: {0}")]
    IssuerRejected(String),

    /// The issuer accepted an update that could not be stored (500).
    #[error("fatal inconsistency: {0}")]
    FatalInconsistency(String),

    /// Any other internal failure (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::InvalidTransition(_) => (StatusCode::FORBIDDEN, "INVALID_TRANSITION"),
            Self::CapacityExceeded(_) => (StatusCode::FORBIDDEN, "CAPACITY_EXCEEDED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::PersistenceConflict(_) => (StatusCode::CONFLICT, "PERSISTENCE_CONFLICT"),
            Self::IssuerUnreachable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ISSUER_UNREACHABLE")
            }
            Self::IssuerRejected(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ISSUER_REJECTED"),
            Self::FatalInconsistency(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "FATAL_INCONSISTENCY")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Whether the client may resubmit the same request unchanged.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::PersistenceConflict(_) | Self::IssuerUnreachable(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::IssuerUnreachable(_) => "The license issuer could not be reached".to_string(),
            Self::IssuerRejected(_) => "The license issuer rejected the update".to_string(),
            Self::FatalInconsistency(_) | Self::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let details = (status == StatusCode::CONFLICT || status.is_server_error())
            .then(|| serde_json::json!({ "retryable": self.retryable() }));

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<lsd_core::ValidationError> for AppError {
    fn from(err: lsd_core::ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::CapacityExceeded { .. } => Self::CapacityExceeded(err.to_string()),
            TransitionError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(err.to_string()),
            StoreError::Conflict { .. } => Self::PersistenceConflict(err.to_string()),
            StoreError::Duplicate(_) => Self::BadRequest(err.to_string()),
            StoreError::Backend(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Transition(e) => e.into(),
            EngineError::Store(e) => e.into(),
            EngineError::IssuerUnreachable(e) => Self::IssuerUnreachable(e.to_string()),
            EngineError::IssuerRejected(e) => Self::IssuerRejected(e.to_string()),
            e @ EngineError::FatalInconsistency { .. } => Self::FatalInconsistency(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsd_state::{Action, PolicyViolation, StatusKind};

    #[test]
    fn status_codes_match_error_table() {
        let cases = [
            (AppError::BadRequest("x".into()), 400, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), 401, "UNAUTHORIZED"),
            (AppError::InvalidTransition("x".into()), 403, "INVALID_TRANSITION"),
            (AppError::CapacityExceeded("x".into()), 403, "CAPACITY_EXCEEDED"),
            (AppError::NotFound("x".into()), 404, "NOT_FOUND"),
            (AppError::PersistenceConflict("x".into()), 409, "PERSISTENCE_CONFLICT"),
            (AppError::IssuerUnreachable("x".into()), 500, "ISSUER_UNREACHABLE"),
            (AppError::IssuerRejected("x".into()), 500, "ISSUER_REJECTED"),
            (AppError::FatalInconsistency("x".into()), 500, "FATAL_INCONSISTENCY"),
            (AppError::Internal("x".into()), 500, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            let (s, c) = err.status_and_code();
            assert_eq!(s.as_u16(), status, "{err}");
            assert_eq!(c, code);
        }
    }

    #[test]
    fn only_conflict_and_unreachable_are_retryable() {
        assert!(AppError::PersistenceConflict("x".into()).retryable());
        assert!(AppError::IssuerUnreachable("x".into()).retryable());
        assert!(!AppError::IssuerRejected("x".into()).retryable());
        assert!(!AppError::FatalInconsistency("x".into()).retryable());
        assert!(!AppError::InvalidTransition("x".into()).retryable());
    }

    #[test]
    fn transition_errors_map_to_forbidden_variants() {
        let err = AppError::from(TransitionError::CapacityExceeded { max: 2 });
        assert!(matches!(err, AppError::CapacityExceeded(_)));

        let err = AppError::from(TransitionError::InvalidTransition {
            action: Action::Renew,
            status: StatusKind::Revoked,
            reason: PolicyViolation::WrongState {
                action: Action::Renew,
                status: StatusKind::Revoked,
            },
        });
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn store_errors_map_by_kind() {
        assert!(matches!(
            AppError::from(StoreError::NotFound("L1".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Conflict {
                license_id: "L1".into(),
                expected_version: 3
            }),
            AppError::PersistenceConflict(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Duplicate("license L1".into())),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Backend("pool closed".into())),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn error_body_omits_absent_details() {
        let body = ErrorBody {
            error: ErrorDetail {
                code: "NOT_FOUND".to_string(),
                message: "gone".to_string(),
                details: None,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("NOT_FOUND"));
        assert!(!json.contains("details"));
    }

    // ── into_response tests ──────────────────────────────────────

    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn into_response_client_error_keeps_message() {
        let (status, body) =
            response_parts(AppError::InvalidTransition("license is revoked".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error.code, "INVALID_TRANSITION");
        assert!(body.error.message.contains("license is revoked"));
        assert!(body.error.details.is_none());
    }

    #[tokio::test]
    async fn into_response_internal_hides_message() {
        let (status, body) = response_parts(AppError::Internal("db password wrong".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(!body.error.message.contains("password"));
        assert_eq!(
            body.error.details,
            Some(serde_json::json!({ "retryable": false }))
        );
    }

    #[tokio::test]
    async fn into_response_issuer_unreachable_is_retryable() {
        let (status, body) = response_parts(AppError::IssuerUnreachable(
            "PATCH /licenses/L1 timed out after 10s".into(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "ISSUER_UNREACHABLE");
        assert!(!body.error.message.contains("PATCH"));
        assert_eq!(
            body.error.details,
            Some(serde_json::json!({ "retryable": true }))
        );
    }

    #[tokio::test]
    async fn into_response_conflict_carries_retryable() {
        let (status, body) =
            response_parts(AppError::PersistenceConflict("version 3 is stale".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body.error.details,
            Some(serde_json::json!({ "retryable": true }))
        );
    }
}
