//! The seam between the transition saga and the issuing server.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use lsd_core::LicenseId;

use crate::error::IssuerError;
use crate::types::IssuerAck;

/// Boxed future returned by [`IssuerNotifier::notify`].
pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<IssuerAck, IssuerError>> + Send + 'a>>;

/// Propagates a new rights end date to the issuing server.
///
/// Held as `Arc<dyn IssuerNotifier>` by the API layer so tests can swap in
/// a scripted implementation. Dropping the returned future abandons the call.
pub trait IssuerNotifier: Send + Sync + std::fmt::Debug {
    /// Set the rights end of `license_id` to `end` (`None` = unlimited).
    fn notify<'a>(&'a self, license_id: &'a LicenseId, end: Option<DateTime<Utc>>)
        -> NotifyFuture<'a>;
}
