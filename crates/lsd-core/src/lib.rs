#![deny(missing_docs)]

//! # lsd-core: Foundational Types for the License Status Stack
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies: only `serde`, `thiserror`,
//! and `chrono` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`LicenseId`] is not a
//!    [`DeviceId`], and neither is a bare `String`. Both are validated on
//!    construction.
//!
//! 2. **Second-precision UTC only.** Every timestamp that reaches a status
//!    document, an event, or the issuing server goes through
//!    [`truncate_to_second`], so stored and rendered values agree.
//!
//! 3. **Time is injected.** Engine code takes `now` as an argument or asks a
//!    [`Clock`]; nothing below the API layer calls `Utc::now()` directly.

pub mod error;
pub mod identity;
pub mod temporal;

pub use error::ValidationError;
pub use identity::{DeviceId, DeviceName, LicenseId};
pub use temporal::{
    format_timestamp, parse_timestamp, truncate_to_second, Clock, FixedClock, SystemClock,
};
