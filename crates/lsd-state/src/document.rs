//! # Status Document
//!
//! The client-facing rendering of a license status. Assembly is read-only:
//! the status is projected at `now`, the message is resolved through a
//! [`Localize`] implementation, links come from the [`LinkBuilder`], and
//! the full event history is listed in ascending order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{EventLog, EventType};
use crate::links::{LicenseLink, LinkBuilder};
use crate::status::{project, LicenseStatus, StatusKind};

/// Resolves the human-readable message for a status.
pub trait Localize: Send + Sync {
    /// Message for `key` in the best language of `accept_language`,
    /// falling back to `default_language`.
    fn resolve(&self, default_language: &str, accept_language: Option<&str>, key: &str) -> String;
}

/// `updated` block of a status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedTimes {
    /// Last license change on the issuing server.
    pub license: DateTime<Utc>,
    /// Last status change.
    pub status: DateTime<Utc>,
}

/// `potential_rights` block of a status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialRights {
    /// Furthest reachable end date.
    pub end: DateTime<Utc>,
}

/// One entry of the `events` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventView {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Device name; absent for operator events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Device id; absent for operator events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Rendered status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    /// License id.
    pub id: String,
    /// Effective status.
    pub status: StatusKind,
    /// Localized message.
    pub message: String,
    /// Last-change times.
    pub updated: UpdatedTimes,
    /// Currently legal next steps.
    pub links: Vec<LicenseLink>,
    /// Renewal ceiling; absent for unlimited licenses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_rights: Option<PotentialRights>,
    /// History, ascending.
    #[serde(default)]
    pub events: Vec<EventView>,
}

/// Builds [`StatusDocument`]s.
#[derive(Debug, Clone)]
pub struct StatusDocumentAssembler {
    links: LinkBuilder,
    default_language: String,
}

impl StatusDocumentAssembler {
    /// Create an assembler rendering links with `links` and falling back to
    /// `default_language` for messages.
    pub fn new(links: LinkBuilder, default_language: impl Into<String>) -> Self {
        Self {
            links,
            default_language: default_language.into(),
        }
    }

    /// Render `status` with its `events` as seen at `now`.
    pub fn assemble(
        &self,
        status: &LicenseStatus,
        events: &EventLog,
        localizer: &dyn Localize,
        accept_language: Option<&str>,
        now: DateTime<Utc>,
    ) -> StatusDocument {
        let effective = project(status, now);
        StatusDocument {
            id: status.license_ref.to_string(),
            status: effective,
            message: localizer.resolve(&self.default_language, accept_language, effective.as_str()),
            updated: UpdatedTimes {
                license: status.license_updated,
                status: status.status_updated,
            },
            links: self.links.build(status, now),
            potential_rights: status.potential_end.map(|end| PotentialRights { end }),
            events: events
                .iter()
                .map(|e| EventView {
                    event_type: e.event_type,
                    name: e.device_name.as_ref().map(|n| n.to_string()),
                    timestamp: e.timestamp,
                    id: e.device_id.as_ref().map(|d| d.to_string()),
                })
                .collect(),
        }
    }
}
