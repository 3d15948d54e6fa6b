//! # lsd-state: License Status Engine
//!
//! The pure core of the license status service. Nothing in this crate
//! performs I/O: every decision is a function of a [`LicenseStatus`]
//! snapshot, the current time, and an immutable [`PolicyConfig`].
//!
//! ## Components
//!
//! - **Status** (`status.rs`): the persisted record, the six-valued
//!   [`StatusKind`], and the lazy-expiry projection [`project`].
//!
//! - **Policy** (`policy.rs`): whether register / return / renew / cancel /
//!   revoke is legal right now, and how far a renewal may reach.
//!
//! - **Devices** (`devices.rs`): idempotent device registration with a
//!   per-license ceiling.
//!
//! - **Events** (`events.rs`): append-only transaction events and the
//!   ordered [`EventLog`] read view.
//!
//! - **Links** (`links.rs`): the hypermedia link set of a status document,
//!   built from a closed set of [`LinkKind`]s.
//!
//! - **Machine** (`machine.rs`): [`StatusStateMachine`] computes the next
//!   record, the event to append, and the rights end date the issuing
//!   server must accept before anything is persisted.
//!
//! - **Document** (`document.rs`): assembles the client-facing
//!   [`StatusDocument`].
//!
//! ## Lifecycle
//!
//! ```text
//! ready ──register──▶ active ──return──▶ returned
//!   │                  │  ▲
//!   │                  │  └─renew / register (same or new device)
//!   │                  ├──revoke──▶ revoked
//!   │                  └──(end passes)──▶ expired
//!   ├──cancel──▶ cancelled
//!   └──revoke──▶ revoked
//! ```

pub mod devices;
pub mod document;
pub mod events;
pub mod links;
pub mod machine;
pub mod policy;
pub mod status;

pub use devices::{DeviceRegistry, Registration};
pub use document::{
    EventView, Localize, PotentialRights, StatusDocument, StatusDocumentAssembler, UpdatedTimes,
};
pub use events::{EventLog, EventType, NewEvent, TransactionEvent, UnknownEventType};
pub use links::{
    LicenseLink, LinkBuilder, LinkConfig, LinkKind, CONTENT_TYPE_LICENSE, CONTENT_TYPE_STATUS,
};
pub use machine::{IssuerUpdate, StatusStateMachine, Transition, TransitionError, TransitionOutcome};
pub use policy::{Action, Policy, PolicyConfig, PolicyViolation};
pub use status::{project, DeviceRecord, LicenseStatus, StatusKind, UnknownStatus};
