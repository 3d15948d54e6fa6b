//! # lsd-issuer-client -- Typed Rust client for the license issuing server
//!
//! The status server owns the lifecycle of a license but not the license
//! itself. Whenever a transition moves the rights end date (return, renew,
//! revoke, cancel) the issuing server must accept the new date before the
//! status server persists anything. This crate is that single outbound
//! call.
//!
//! ## Failure taxonomy
//!
//! - **Network** ([`IssuerError::Unreachable`], [`IssuerError::Timeout`]):
//!   no answer within the deadline. Safe to retry from the device side.
//! - **Rejected** ([`IssuerError::Rejected`]): the issuer answered with
//!   anything but `200 OK`. Surfaced to the caller, never retried.

pub mod client;
pub mod config;
pub mod error;
pub mod notifier;
pub mod types;

pub use client::IssuerClient;
pub use config::{ConfigError, IssuerConfig};
pub use error::IssuerError;
pub use notifier::{IssuerNotifier, NotifyFuture};
pub use types::{IssuerAck, LicenseUpdate};
