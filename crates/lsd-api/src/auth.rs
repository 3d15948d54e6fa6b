//! # Operator Authentication
//!
//! HTTP Basic middleware guarding operator endpoints (license creation,
//! revoke/cancel, device listings, resync). Device-facing endpoints are
//! public.
//!
//! When no [`OperatorAuthConfig`] credentials are configured, every request
//! passes (development mode).

use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::{Authorization, HeaderMapExt};
use subtle::ConstantTimeEq;

use crate::config::{OperatorAuth, Secret};
use crate::error::{ErrorBody, ErrorDetail};

/// Operator credentials injected into request extensions.
///
/// Custom `Debug` redacts the password.
#[derive(Clone, Default)]
pub struct OperatorAuthConfig {
    credentials: Option<(String, Secret)>,
}

impl OperatorAuthConfig {
    /// Require `username` / `password` on operator endpoints.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((username.into(), Secret::new(password))),
        }
    }

    /// Let every request through.
    pub fn disabled() -> Self {
        Self { credentials: None }
    }

    /// Whether credentials are enforced.
    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }
}

impl From<Option<&OperatorAuth>> for OperatorAuthConfig {
    fn from(auth: Option<&OperatorAuth>) -> Self {
        match auth {
            Some(auth) => Self {
                credentials: Some((auth.username.clone(), auth.password.clone())),
            },
            None => Self::disabled(),
        }
    }
}

impl std::fmt::Debug for OperatorAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorAuthConfig")
            .field(
                "credentials",
                &self.credentials.as_ref().map(|(user, _)| (user, "[REDACTED]")),
            )
            .finish()
    }
}

/// Constant-time comparison of credentials.
///
/// On length mismatch a dummy comparison keeps timing independent of
/// which check failed.
fn constant_time_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Reject requests without valid operator Basic credentials.
pub async fn operator_auth_middleware(request: Request, next: Next) -> Response {
    let config = request
        .extensions()
        .get::<OperatorAuthConfig>()
        .cloned()
        .unwrap_or_default();

    let Some((username, password)) = &config.credentials else {
        return next.run(request).await;
    };

    match request.headers().typed_get::<Authorization<Basic>>() {
        Some(Authorization(basic)) => {
            let user_ok = constant_time_eq(basic.username(), username);
            let pass_ok = constant_time_eq(basic.password(), password.expose());
            if user_ok & pass_ok {
                next.run(request).await
            } else {
                tracing::warn!(username = %basic.username(), "operator authentication failed: bad credentials");
                unauthorized_response("invalid operator credentials")
            }
        }
        None => {
            tracing::warn!("operator authentication failed: missing basic credentials");
            unauthorized_response("missing operator credentials")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"lsd\""),
    );
    response
}
