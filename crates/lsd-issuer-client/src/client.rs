//! Typed client for the issuer's license update endpoint.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | PATCH  | `/licenses/{id}` | Update the rights end date |
//!
//! The request is sent once. A transport failure or timeout is reported as
//! a network error and never retried here: the device resubmits its action
//! and the whole transition is recomputed from fresh state.

use std::time::Duration;

use chrono::{DateTime, Utc};

use lsd_core::LicenseId;

use crate::config::{ConfigError, IssuerConfig};
use crate::error::IssuerError;
use crate::notifier::{IssuerNotifier, NotifyFuture};
use crate::types::{IssuerAck, LicenseUpdate};

/// Media type of the partial license body.
pub const CONTENT_TYPE_LICENSE: &str = "application/vnd.readium.lcp.license.v1.0+json";

/// Client for the issuing server.
#[derive(Debug, Clone)]
pub struct IssuerClient {
    http: reqwest::Client,
    config: IssuerConfig,
}

impl IssuerClient {
    /// Create a new issuer client from configuration.
    pub fn new(config: IssuerConfig) -> Result<Self, IssuerError> {
        if config.timeout_secs == 0 {
            return Err(IssuerError::Config(ConfigError::ZeroTimeout));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IssuerError::Unreachable {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self { http, config })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Set the rights end date of `license_id` on the issuer.
    ///
    /// Calls `PATCH {base_url}/licenses/{id}`. Only `200 OK` counts as success.
    pub async fn update_rights(
        &self,
        license_id: &LicenseId,
        end: Option<DateTime<Utc>>,
    ) -> Result<IssuerAck, IssuerError> {
        let endpoint = format!("PATCH /licenses/{license_id}");
        let url = self.license_url(license_id)?;
        let body = LicenseUpdate::rights_end(license_id.clone(), end);

        let mut request = self
            .http
            .patch(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_LICENSE)
            .json(&body);
        if self.config.has_credentials() {
            request = request.basic_auth(
                &self.config.username,
                Some(self.config.password.as_str()),
            );
        }

        tracing::debug!(license_id = %license_id, end = ?body.rights.end, "notifying issuer");
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                IssuerError::Timeout {
                    endpoint: endpoint.clone(),
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                IssuerError::Unreachable {
                    endpoint: endpoint.clone(),
                    source: e,
                }
            }
        })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(IssuerError::Rejected {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        Ok(IssuerAck {
            status: status.as_u16(),
        })
    }

    fn license_url(&self, license_id: &LicenseId) -> Result<url::Url, IssuerError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                IssuerError::Config(ConfigError::InvalidUrl(
                    self.config.base_url.to_string(),
                    "not a base URL".into(),
                ))
            })?
            .pop_if_empty()
            .push("licenses")
            .push(license_id.as_str());
        Ok(url)
    }
}

impl IssuerNotifier for IssuerClient {
    fn notify<'a>(
        &'a self,
        license_id: &'a LicenseId,
        end: Option<DateTime<Utc>>,
    ) -> NotifyFuture<'a> {
        Box::pin(self.update_rights(license_id, end))
    }
}
