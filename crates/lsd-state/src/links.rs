//! # Hypermedia Links
//!
//! Every status document carries the links a client may follow next. The
//! set is drawn from a closed list of [`LinkKind`]s, each with a fixed
//! relation, media type and query placeholder list, so the rendered
//! templates (`/register{?id,name}`, `/renew{?end,id,name}`) are exact and
//! testable.
//!
//! ## Inclusion rules
//!
//! - `license` is always present.
//! - `register` is present while registration is open, even at the device
//!   ceiling, so an already-registered device can retry.
//! - `return` / `renew` are present only when the rights window has an end
//!   date and the [`Policy`] currently allows the action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Policy;
use crate::status::LicenseStatus;

/// Media type of the license document on the issuing server.
pub const CONTENT_TYPE_LICENSE: &str = "application/vnd.readium.lcp.license.v1.0+json";

/// Media type of a status document and of every device action response.
pub const CONTENT_TYPE_STATUS: &str = "application/vnd.readium.license.status.v1.0+json";

/// Placeholder substituted with the license id in a configured license link.
pub const LICENSE_ID_PLACEHOLDER: &str = "{license_id}";

/// The closed set of links a status document can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// The license document itself.
    License,
    /// Device registration.
    Register,
    /// Device return.
    Return,
    /// Device renewal.
    Renew,
}

impl LinkKind {
    /// Link relation.
    pub fn rel(&self) -> &'static str {
        match self {
            Self::License => "license",
            Self::Register => "register",
            Self::Return => "return",
            Self::Renew => "renew",
        }
    }

    /// Query placeholders of the URI template, in rendering order.
    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            Self::License => &[],
            Self::Register | Self::Return => &["id", "name"],
            Self::Renew => &["end", "id", "name"],
        }
    }

    /// Media type of the link target.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::License => CONTENT_TYPE_LICENSE,
            _ => CONTENT_TYPE_STATUS,
        }
    }

    /// Whether the href is a URI template.
    pub fn is_templated(&self) -> bool {
        !self.placeholders().is_empty()
    }
}

/// One rendered link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseLink {
    /// Relation.
    pub rel: String,
    /// Target, possibly a URI template.
    pub href: String,
    /// Media type of the target.
    #[serde(rename = "type")]
    pub media_type: String,
    /// Whether `href` must be expanded before use.
    pub templated: bool,
}

/// Server identity needed to render links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Public base URL of this status server.
    pub status_base_url: String,
    /// Public base URL of the issuing server.
    pub issuer_base_url: String,
    /// Optional license link template containing `{license_id}`.
    pub license_link_template: Option<String>,
}

/// Renders the link set of a status document.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    config: LinkConfig,
    policy: Policy,
}

impl LinkBuilder {
    /// Create a builder. Trailing slashes on base URLs are dropped.
    pub fn new(config: LinkConfig, policy: Policy) -> Self {
        let config = LinkConfig {
            status_base_url: config.status_base_url.trim_end_matches('/').to_string(),
            issuer_base_url: config.issuer_base_url.trim_end_matches('/').to_string(),
            license_link_template: config
                .license_link_template
                .filter(|t| !t.trim().is_empty()),
        };
        Self { config, policy }
    }

    /// Which kinds apply to `status` at `now`, in rendering order.
    pub fn kinds(&self, status: &LicenseStatus, now: DateTime<Utc>) -> Vec<LinkKind> {
        let mut kinds = vec![LinkKind::License];
        if self.policy.registration_open(status, now).is_ok() {
            kinds.push(LinkKind::Register);
        }
        if status.has_rights_end() {
            if self.policy.can_return(status, now).is_ok() {
                kinds.push(LinkKind::Return);
            }
            if self.policy.can_renew(status, now).is_ok() {
                kinds.push(LinkKind::Renew);
            }
        }
        kinds
    }

    /// The full link set of `status` at `now`.
    pub fn build(&self, status: &LicenseStatus, now: DateTime<Utc>) -> Vec<LicenseLink> {
        self.kinds(status, now)
            .into_iter()
            .map(|kind| self.render(kind, status))
            .collect()
    }

    /// Render one link for `status`.
    pub fn render(&self, kind: LinkKind, status: &LicenseStatus) -> LicenseLink {
        let license_id = status.license_ref.as_str();
        let href = match kind {
            LinkKind::License => match &self.config.license_link_template {
                Some(template) => template.replace(LICENSE_ID_PLACEHOLDER, license_id),
                None => format!("{}/licenses/{}", self.config.issuer_base_url, license_id),
            },
            action => format!(
                "{}/licenses/{}/{}{{?{}}}",
                self.config.status_base_url,
                license_id,
                action.rel(),
                action.placeholders().join(",")
            ),
        };
        LicenseLink {
            rel: kind.rel().to_string(),
            href,
            media_type: kind.media_type().to_string(),
            templated: kind.is_templated(),
        }
    }
}
