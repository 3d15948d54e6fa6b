//! # lsd-api: License Status Service
//!
//! Axum service exposing the license status engine: status documents,
//! device actions, operator transitions, and administrative resync.
//!
//! ## API Surface
//!
//! | Path | Module | Auth |
//! |------|--------|------|
//! | `GET /licenses/{id}/status` | [`routes::status`] | public |
//! | `POST /licenses/{id}/register\|return\|renew` | [`routes::devices`] | public |
//! | `PUT /licenses`, `GET /licenses` | [`routes::licenses`] | operator |
//! | `PATCH /licenses/{id}/status`, `GET /licenses/{id}/registered` | [`routes::licenses`] | operator |
//! | `POST /admin/resync` | [`routes::admin`] | operator |
//! | `GET /health/*`, `GET /openapi.json` | this module, [`openapi`] | public |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! CatchPanic → Trace → CORS → X-Add-Delay → OperatorAuth (operator routes) → Handler
//! ```

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod i18n;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod store;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use crate::auth::OperatorAuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks are mounted outside every other layer so they answer even
/// when a handler misbehaves.
pub fn app(state: AppState) -> Router {
    let auth_config = OperatorAuthConfig::from(state.config.operator_auth.as_ref());
    if !auth_config.is_enabled() {
        tracing::warn!("operator_auth not configured; operator endpoints are open");
    }

    let operator = Router::new()
        .merge(routes::licenses::router())
        .merge(routes::admin::router())
        .layer(from_fn(auth::operator_auth_middleware));

    let api = Router::new()
        .merge(routes::status::router())
        .merge(routes::devices::router())
        .merge(operator)
        .merge(openapi::router())
        .layer(from_fn(middleware::delay::delay_middleware))
        .layer(CorsLayer::permissive())
        .layer(middleware::tracing_layer::layer())
        .layer(CatchPanicLayer::new())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness check: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
