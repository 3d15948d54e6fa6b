//! Wire types of the issuer's partial license update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lsd_core::LicenseId;

/// Partial license sent to `PATCH /licenses/{id}`.
///
/// Only the rights end date changes; `end: null` makes the license unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseUpdate {
    pub id: LicenseId,
    pub rights: RightsUpdate,
}

/// `rights` member of a [`LicenseUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsUpdate {
    pub end: Option<DateTime<Utc>>,
}

impl LicenseUpdate {
    /// Update setting the rights end of `id` to `end`.
    pub fn rights_end(id: LicenseId, end: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            rights: RightsUpdate {
                end: end.map(lsd_core::truncate_to_second),
            },
        }
    }
}

/// Successful acknowledgement from the issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuerAck {
    /// HTTP status the issuer answered with.
    pub status: u16,
}
